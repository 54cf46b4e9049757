use std::path::Path;

use ethers::{
    signers::{LocalWallet, Signer},
    types::Address,
};
use log::info;
use serde_json::Value;

use evmscript_common::{
    config::{WALLET_ADDRESS_VAR, WALLET_KEY_VAR},
    crypto::wallet_private_key_hex,
    utils::format_address,
};

use crate::{
    error::{ScriptError, ScriptResult},
    resolver::VariableTable,
};

/// Decrypt a keystore file and expose its account to the script.
///
/// The address and the private key are injected as the reserved
/// variables, so steps can use them as `key` or as arguments.
pub fn unlock_wallet<P: AsRef<Path>>(
    path: P,
    password: &str,
    vars: &mut VariableTable,
) -> ScriptResult<Address> {
    let path = path.as_ref();
    let wallet = LocalWallet::decrypt_keystore(path, password).map_err(|e| {
        ScriptError::Signing(format!("Failed unlocking wallet {}: {}", path.display(), e))
    })?;

    let address = wallet.address();
    vars.insert(
        WALLET_ADDRESS_VAR.to_string(),
        Value::String(format_address(&address)),
    );
    vars.insert(
        WALLET_KEY_VAR.to_string(),
        Value::String(wallet_private_key_hex(&wallet)),
    );

    info!("Wallet {} unlocked", format_address(&address));
    Ok(address)
}
