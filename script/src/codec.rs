//! Conversion between script values and ABI tokens
//!
//! Arguments are written in the script as JSON values and bound to the
//! declared parameters by position. Event parameters go the other way
//! to be shown as JSON.

use ethers::{
    abi::{
        token::{LenientTokenizer, Tokenizer},
        Param, ParamType, Token,
    },
    types::{I256, U256},
};
use serde_json::Value;

use evmscript_common::{
    crypto::{parse_address, strip_hex_prefix},
    utils::{format_address, parse_u256},
};

use crate::{
    error::{ScriptError, ScriptResult},
    resolver::value_as_string,
};

fn param_label(param: &Param, index: usize) -> String {
    if param.name.is_empty() {
        format!("#{index}")
    } else {
        param.name.clone()
    }
}

/// Bind positional arguments to the declared parameters.
/// Arguments beyond the declared ones are ignored.
pub fn bind_arguments(inputs: &[Param], args: &[Value]) -> ScriptResult<Vec<Token>> {
    inputs
        .iter()
        .enumerate()
        .map(|(index, param)| {
            let label = param_label(param, index);
            let arg = args
                .get(index)
                .ok_or_else(|| ScriptError::MissingArgument { param: label.clone() })?;
            value_to_token(&param.kind, arg, &label)
        })
        .collect()
}

fn parse_error(param: &str, reason: impl ToString) -> ScriptError {
    ScriptError::ArgumentParseError {
        param: param.to_string(),
        reason: reason.to_string(),
    }
}

fn is_array(kind: &ParamType) -> bool {
    matches!(kind, ParamType::Array(_) | ParamType::FixedArray(..))
}

/// Convert a single argument to the token of the given type
pub fn value_to_token(kind: &ParamType, value: &Value, param: &str) -> ScriptResult<Token> {
    // Arrays may be given as a JSON encoded string
    if is_array(kind) {
        if let Value::String(encoded) = value {
            let decoded: Value = serde_json::from_str(encoded).map_err(|e| parse_error(param, e))?;
            return value_to_token(kind, &decoded, param);
        }
    }

    match (kind, value) {
        (ParamType::Array(inner), Value::Array(items)) => items
            .iter()
            .map(|item| value_to_token(inner, item, param))
            .collect::<ScriptResult<Vec<_>>>()
            .map(Token::Array),
        (ParamType::FixedArray(inner, size), Value::Array(items)) => {
            if items.len() != *size {
                return Err(parse_error(
                    param,
                    format!("expected {} elements, got {}", size, items.len()),
                ));
            }
            items
                .iter()
                .map(|item| value_to_token(inner, item, param))
                .collect::<ScriptResult<Vec<_>>>()
                .map(Token::FixedArray)
        }
        (ParamType::Tuple(kinds), Value::Array(items)) => {
            if items.len() != kinds.len() {
                return Err(parse_error(
                    param,
                    format!("expected {} tuple fields, got {}", kinds.len(), items.len()),
                ));
            }
            kinds
                .iter()
                .zip(items)
                .map(|(kind, item)| value_to_token(kind, item, param))
                .collect::<ScriptResult<Vec<_>>>()
                .map(Token::Tuple)
        }
        (ParamType::Array(_) | ParamType::FixedArray(..) | ParamType::Tuple(_), other) => {
            Err(parse_error(param, format!("expected an array, got {other}")))
        }
        (kind, value) => {
            let text = value_as_string(value)
                .ok_or_else(|| parse_error(param, format!("unsupported value {value}")))?;
            scalar_to_token(kind, &text, param)
        }
    }
}

fn scalar_to_token(kind: &ParamType, raw: &str, param: &str) -> ScriptResult<Token> {
    // Strings are taken verbatim, other scalars ignore surrounding spaces
    if let ParamType::String = kind {
        return Ok(Token::String(raw.to_string()));
    }

    let text = raw.trim();
    match kind {
        ParamType::Address => parse_address(text)
            .map(Token::Address)
            .map_err(|e| parse_error(param, e)),
        ParamType::Bytes => hex::decode(strip_hex_prefix(text))
            .map(Token::Bytes)
            .map_err(|e| parse_error(param, e)),
        ParamType::FixedBytes(size) => {
            let bytes = hex::decode(strip_hex_prefix(text)).map_err(|e| parse_error(param, e))?;
            if bytes.len() > *size {
                return Err(parse_error(
                    param,
                    format!("expected at most {} bytes, got {}", size, bytes.len()),
                ));
            }
            let mut padded = bytes;
            padded.resize(*size, 0);
            Ok(Token::FixedBytes(padded))
        }
        ParamType::Uint(_) => match parse_u256(text) {
            Some(value) => Ok(Token::Uint(value)),
            // units such as "1 ether"
            None => LenientTokenizer::tokenize_uint(text)
                .map(|bytes| Token::Uint(U256::from_big_endian(&bytes)))
                .map_err(|e| parse_error(param, e)),
        },
        ParamType::Int(_) => LenientTokenizer::tokenize_int(text)
            .map(|bytes| Token::Int(U256::from_big_endian(&bytes)))
            .map_err(|e| parse_error(param, e)),
        ParamType::Bool => match text {
            "true" | "1" => Ok(Token::Bool(true)),
            "false" | "0" => Ok(Token::Bool(false)),
            other => Err(parse_error(param, format!("invalid boolean {other}"))),
        },
        other => Err(parse_error(param, format!("unsupported parameter type {other}"))),
    }
}

/// Render a decoded token as JSON for event messages
pub fn token_to_json(token: &Token) -> Value {
    match token {
        Token::Address(address) => Value::String(format_address(address)),
        Token::Uint(value) => Value::String(value.to_string()),
        Token::Int(value) => Value::String(I256::from_raw(*value).to_string()),
        Token::Bool(value) => Value::Bool(*value),
        Token::String(value) => Value::String(value.clone()),
        Token::Bytes(bytes) | Token::FixedBytes(bytes) => {
            Value::String(format!("0x{}", hex::encode(bytes)))
        }
        Token::Array(items) | Token::FixedArray(items) | Token::Tuple(items) => {
            Value::Array(items.iter().map(token_to_json).collect())
        }
    }
}

/// Textual form used for assertion messages
pub fn token_to_string(token: &Token) -> String {
    match token_to_json(token) {
        Value::String(s) => s,
        other => other.to_string(),
    }
}
