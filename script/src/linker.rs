//! Library linking
//!
//! Unlinked bytecode references each library through a placeholder as
//! wide as a hex encoded address. Two forms exist:
//! - `__<name padded with underscores>`, where the name may be written
//!   `path/Lib.sol:Lib`. Only the part before `:` is used and a trailing
//!   `.sol` is dropped.
//! - `__$<hash>$__`, the hash being the start of the Keccak-256 of the
//!   fully qualified library name `<source file>:<Lib>`. It is mapped back
//!   to the library through the references collected at compilation.

use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::{Captures, Regex};

use evmscript_common::{config::LIBRARY_PLACEHOLDER_WIDTH, crypto::keccak256_hex};

use crate::{
    error::{ScriptError, ScriptResult},
    resolver::AddressTable,
};

/// Hash of a hashed placeholder to the name of its library
pub type LinkReferences = IndexMap<String, String>;

// `__$` and `$__` around the hash
const HASH_WIDTH: usize = LIBRARY_PLACEHOLDER_WIDTH - 6;

lazy_static! {
    // Hashed placeholders first, the named form would match them too
    static ref PLACEHOLDER: Regex = Regex::new(&format!(
        r"__\$([0-9a-fA-F]{{{}}})\$__|__(.{{{}}})",
        HASH_WIDTH,
        LIBRARY_PLACEHOLDER_WIDTH - 2
    ))
    .expect("library placeholder regex");
}

/// Library name referenced by a named placeholder token
pub fn library_name(placeholder: &str) -> &str {
    let name = placeholder.trim_matches('_');
    let name = name.split(':').next().unwrap_or(name);
    name.strip_suffix(".sol").unwrap_or(name)
}

/// Hash used in the placeholders of a library given its
/// fully qualified name
pub fn placeholder_hash(qualified_name: &str) -> String {
    let mut hash = keccak256_hex(qualified_name.as_bytes());
    hash.truncate(HASH_WIDTH);
    hash
}

/// Build the references of every `<source file>:<contract>` name
pub fn link_references<'a, I: IntoIterator<Item = &'a str>>(qualified_names: I) -> LinkReferences {
    qualified_names
        .into_iter()
        .filter_map(|qualified| {
            let (_, name) = qualified.rsplit_once(':')?;
            Some((placeholder_hash(qualified), name.to_string()))
        })
        .collect()
}

fn library_of(captures: &Captures, references: &LinkReferences) -> ScriptResult<String> {
    match captures.get(1) {
        Some(hash) => references
            .get(&hash.as_str().to_lowercase())
            .cloned()
            .ok_or_else(|| ScriptError::UnknownLibraryAddress(format!("__${}$__", hash.as_str()))),
        None => Ok(library_name(&captures[0]).to_string()),
    }
}

/// Replace every placeholder with the address of its deployed library
pub fn link_bytecode(
    bytecode: &str,
    addresses: &AddressTable,
    references: &LinkReferences,
) -> ScriptResult<String> {
    let mut linked = String::with_capacity(bytecode.len());
    let mut last = 0;
    for captures in PLACEHOLDER.captures_iter(bytecode) {
        let Some(found) = captures.get(0) else { continue };
        let library = library_of(&captures, references)?;
        let address = addresses
            .get(&library)
            .ok_or(ScriptError::UnknownLibraryAddress(library))?;

        linked.push_str(&bytecode[last..found.start()]);
        linked.push_str(&hex::encode(address.as_bytes()));
        last = found.end();
    }
    linked.push_str(&bytecode[last..]);
    Ok(linked)
}

/// Names of all libraries referenced by the bytecode, in order of appearance.
/// A hashed placeholder without reference is listed as is.
pub fn referenced_libraries(bytecode: &str, references: &LinkReferences) -> Vec<String> {
    let mut libraries: Vec<String> = Vec::new();
    for captures in PLACEHOLDER.captures_iter(bytecode) {
        let name = library_of(&captures, references).unwrap_or_else(|_| captures[0].to_string());
        if !libraries.contains(&name) {
            libraries.push(name);
        }
    }
    libraries
}
