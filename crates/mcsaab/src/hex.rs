//! Hex text for captured byte streams and payload arguments.

use hex::FromHexError;

/// Lower-case hex with a space between bytes.
pub fn encode(bytes: &[u8]) -> String {
    bytes.chunks(1).map(hex::encode).collect::<Vec<_>>().join(" ")
}

/// Parse hex digits. Whitespace, `:` and `,` separators and `0x` prefixes
/// are skipped, so dumps from most capture tools paste straight in.
pub fn decode(text: &str) -> Result<Vec<u8>, String> {
    let digits: String = text
        .split(|c: char| c.is_whitespace() || c == ':' || c == ',')
        .map(|token| {
            token
                .strip_prefix("0x")
                .or_else(|| token.strip_prefix("0X"))
                .unwrap_or(token)
        })
        .collect();
    hex::decode(&digits).map_err(|err| match err {
        FromHexError::InvalidHexCharacter { c, .. } => format!("invalid hex digit {c:?}"),
        FromHexError::OddLength => format!("odd number of hex digits ({})", digits.len()),
        other => other.to_string(),
    })
}
