//! Function selectors and canonical signatures.
//!
//! A selector is the first four bytes of the Keccak-256 hash of a function's
//! canonical signature. The canonical form is `name(type,type,...)`:
//!
//! - no whitespace anywhere
//! - no parameter names, no return types
//! - no type aliases (`uint256`, never `uint`)
//!
//! Signatures that are not canonical are rejected up front with
//! `CutError::InvalidSignatureFormat` rather than hashed into a selector that
//! silently routes nowhere.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};

use crate::error::CutError;

/// Width of a selector in bytes.
pub const SELECTOR_LEN: usize = 4;

/// A 4-byte function selector.
///
/// Ordering is byte-wise, which gives the registry a canonical iteration order.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Selector([u8; SELECTOR_LEN]);

impl Selector {
    /// Wrap raw selector bytes.
    pub const fn from_bytes(bytes: [u8; SELECTOR_LEN]) -> Self {
        Self(bytes)
    }

    /// Raw selector bytes.
    pub fn as_bytes(&self) -> &[u8; SELECTOR_LEN] {
        &self.0
    }

    /// Lowercase `0x`-prefixed hex form.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Parse from hex, with or without the `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, CutError> {
        let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
        if digits.len() != SELECTOR_LEN * 2 {
            return Err(CutError::InvalidSelector(format!(
                "{s}: expected {} hex digits",
                SELECTOR_LEN * 2
            )));
        }
        let mut bytes = [0u8; SELECTOR_LEN];
        hex::decode_to_slice(digits, &mut bytes)
            .map_err(|e| CutError::InvalidSelector(format!("{s}: {e}")))?;
        Ok(Self(bytes))
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Selector({})", self.to_hex())
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Selector {
    type Err = CutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for Selector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Selector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// A validated canonical function signature, e.g. `setListingFee(uint256)`.
///
/// The selector is computed once at parse time.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FunctionSignature {
    text: String,
    selector: Selector,
}

impl FunctionSignature {
    /// Parse and validate a canonical signature.
    pub fn parse(signature: &str) -> Result<Self, CutError> {
        validate_signature(signature).map_err(|reason| CutError::InvalidSignatureFormat {
            signature: signature.to_string(),
            reason,
        })?;

        Ok(Self {
            text: signature.to_string(),
            selector: keccak_selector(signature.as_bytes()),
        })
    }

    /// The signature text.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Function name (everything before the opening parenthesis).
    pub fn name(&self) -> &str {
        self.text.split('(').next().unwrap_or_default()
    }

    /// The selector derived from this signature.
    pub fn selector(&self) -> Selector {
        self.selector
    }
}

impl fmt::Debug for FunctionSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FunctionSignature({} => {})", self.text, self.selector)
    }
}

impl fmt::Display for FunctionSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl FromStr for FunctionSignature {
    type Err = CutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for FunctionSignature {
    type Error = CutError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<FunctionSignature> for String {
    fn from(signature: FunctionSignature) -> Self {
        signature.text
    }
}

/// Compute the selector of a canonical signature.
///
/// Pure and deterministic. Fails with `InvalidSignatureFormat` when the input
/// is not canonical.
pub fn selector_of(signature: &str) -> Result<Selector, CutError> {
    FunctionSignature::parse(signature).map(|s| s.selector())
}

fn keccak_selector(bytes: &[u8]) -> Selector {
    let digest = Keccak256::digest(bytes);
    let mut out = [0u8; SELECTOR_LEN];
    out.copy_from_slice(&digest[..SELECTOR_LEN]);
    Selector(out)
}

// ─────────────────────────────────────────────────────────────────────────────
// Canonical grammar
// ─────────────────────────────────────────────────────────────────────────────

fn validate_signature(signature: &str) -> Result<(), String> {
    if signature.is_empty() {
        return Err("signature is empty".to_string());
    }
    if let Some(c) = signature.chars().find(|c| c.is_whitespace()) {
        return Err(format!("contains whitespace {c:?}"));
    }

    let open = signature
        .find('(')
        .ok_or_else(|| "missing parameter list".to_string())?;
    validate_identifier(&signature[..open])?;

    let mut parser = TypeListParser {
        src: signature.as_bytes(),
        pos: open,
    };
    parser.tuple()?;

    if parser.pos != signature.len() {
        return Err(format!(
            "unexpected trailing input '{}' (return types are not part of a signature)",
            &signature[parser.pos..]
        ));
    }
    Ok(())
}

fn validate_identifier(name: &str) -> Result<(), String> {
    let mut chars = name.chars();
    match chars.next() {
        None => return Err("missing function name".to_string()),
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        Some(c) => return Err(format!("function name cannot start with {c:?}")),
    }
    if let Some(c) = chars.find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '$')) {
        return Err(format!("invalid character {c:?} in function name"));
    }
    Ok(())
}

/// Recursive-descent validator for `(T1,T2,...)` parameter lists.
struct TypeListParser<'a> {
    src: &'a [u8],
    pos: usize,
}

impl TypeListParser<'_> {
    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn expect(&mut self, byte: u8) -> Result<(), String> {
        match self.peek() {
            Some(b) if b == byte => {
                self.pos += 1;
                Ok(())
            }
            Some(b) => Err(format!(
                "expected '{}' at offset {}, found '{}'",
                byte as char, self.pos, b as char
            )),
            None => Err(format!("expected '{}' at end of input", byte as char)),
        }
    }

    fn tuple(&mut self) -> Result<(), String> {
        self.expect(b'(')?;
        if self.peek() == Some(b')') {
            self.pos += 1;
            return Ok(());
        }
        loop {
            self.param()?;
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b')') => {
                    self.pos += 1;
                    return Ok(());
                }
                Some(b) => {
                    return Err(format!(
                        "unexpected '{}' at offset {}",
                        b as char, self.pos
                    ))
                }
                None => return Err("unterminated parameter list".to_string()),
            }
        }
    }

    fn param(&mut self) -> Result<(), String> {
        if self.peek() == Some(b'(') {
            self.tuple()?;
        } else {
            let start = self.pos;
            while matches!(self.peek(), Some(b) if b.is_ascii_alphanumeric()) {
                self.pos += 1;
            }
            if start == self.pos {
                return Err(format!("empty type at offset {start}"));
            }
            // Only ASCII alphanumerics were consumed.
            let base = String::from_utf8_lossy(&self.src[start..self.pos]);
            validate_elementary(&base)?;
        }

        while self.peek() == Some(b'[') {
            self.pos += 1;
            let start = self.pos;
            while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
                self.pos += 1;
            }
            if self.pos > start {
                let len = String::from_utf8_lossy(&self.src[start..self.pos]);
                if len.starts_with('0') {
                    return Err(format!("invalid fixed array length '{len}'"));
                }
            }
            self.expect(b']')?;
        }
        Ok(())
    }
}

fn validate_elementary(base: &str) -> Result<(), String> {
    match base {
        "address" | "bool" | "string" | "bytes" | "function" => return Ok(()),
        "uint" => return Err("non-canonical alias 'uint' (use 'uint256')".to_string()),
        "int" => return Err("non-canonical alias 'int' (use 'int256')".to_string()),
        "byte" => return Err("non-canonical alias 'byte' (use 'bytes1')".to_string()),
        _ => {}
    }

    let sized = base
        .strip_prefix("uint")
        .or_else(|| base.strip_prefix("int"))
        .map(|bits| (bits, 8..=256, 8))
        .or_else(|| base.strip_prefix("bytes").map(|n| (n, 1..=32, 1)));

    match sized {
        Some((width, range, step)) if !width.is_empty() && !width.starts_with('0') => {
            match width.parse::<u16>() {
                Ok(n) if range.contains(&n) && n % step == 0 => Ok(()),
                _ => Err(format!("invalid width in type '{base}'")),
            }
        }
        _ => Err(format!("unknown type '{base}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_selectors() {
        let cases = [
            ("transfer(address,uint256)", "0xa9059cbb"),
            ("balanceOf(address)", "0x70a08231"),
            ("approve(address,uint256)", "0x095ea7b3"),
            ("supportsInterface(bytes4)", "0x01ffc9a7"),
            ("owner()", "0x8da5cb5b"),
            ("transferOwnership(address)", "0xf2fde38b"),
            ("facets()", "0x7a0ed627"),
            ("diamondCut((address,uint8,bytes4[])[],address,bytes)", "0x1f931c1c"),
            ("init()", "0xe1c7392a"),
        ];
        for (signature, expected) in cases {
            assert_eq!(selector_of(signature).unwrap().to_hex(), expected, "{signature}");
        }
    }

    #[test]
    fn test_selector_determinism() {
        let first = selector_of("getOwner()").unwrap();
        for _ in 0..100 {
            assert_eq!(selector_of("getOwner()").unwrap(), first);
        }
    }

    #[test]
    fn test_distinct_signatures_distinct_selectors() {
        let a = selector_of("setListingFee(uint256)").unwrap();
        let b = selector_of("setEthPriceFeed(address)").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_rejects_non_canonical() {
        let bad = [
            "",
            "getOwner",
            "getOwner( )",
            "transfer(address, uint256)",
            "transfer(address to,uint256 amount)",
            "balanceOf(address)returns(uint256)",
            "f(uint)",
            "f(int)",
            "f(byte)",
            "f(uint7)",
            "f(uint264)",
            "f(bytes0)",
            "f(bytes33)",
            "f(uint256,)",
            "f(,uint256)",
            "f(uint256",
            "f(uint256[)",
            "f(uint256[01])",
            "f(foo)",
            "1f()",
            "(uint256)",
        ];
        for signature in bad {
            let err = selector_of(signature).unwrap_err();
            assert!(
                matches!(err, CutError::InvalidSignatureFormat { .. }),
                "{signature:?} should be rejected, got {err:?}"
            );
        }
    }

    #[test]
    fn test_accepts_composite_types() {
        let good = [
            "getTokenRate(address,uint256)",
            "f(uint8[],bytes32[4][])",
            "f((address,uint256)[],bool)",
            "f(((uint256,bytes),string)[2])",
            "f(int128,bytes1,function)",
            "_$private()",
        ];
        for signature in good {
            assert!(selector_of(signature).is_ok(), "{signature:?} should parse");
        }
    }

    #[test]
    fn test_signature_name() {
        let sig = FunctionSignature::parse("setEthPriceFeed(address)").unwrap();
        assert_eq!(sig.name(), "setEthPriceFeed");
        assert_eq!(sig.as_str(), "setEthPriceFeed(address)");
    }

    #[test]
    fn test_selector_hex_parsing() {
        let sel = Selector::from_hex("0xA9059CBB").unwrap();
        assert_eq!(sel, selector_of("transfer(address,uint256)").unwrap());
        assert_eq!(Selector::from_hex("a9059cbb").unwrap(), sel);
        assert!(Selector::from_hex("0xa9059c").is_err());
        assert!(Selector::from_hex("0xzz059cbb").is_err());
    }

    #[test]
    fn test_serde_forms() {
        let sig = FunctionSignature::parse("owner()").unwrap();
        let json = serde_json::to_string(&sig).unwrap();
        assert_eq!(json, "\"owner()\"");

        let back: FunctionSignature = serde_json::from_str(&json).unwrap();
        assert_eq!(back.selector(), sig.selector());

        assert!(serde_json::from_str::<FunctionSignature>("\"owner ()\"").is_err());
        assert_eq!(serde_json::to_string(&sig.selector()).unwrap(), "\"0x8da5cb5b\"");
    }
}
