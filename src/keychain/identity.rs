//! Parsing of `security find-identity` listings.
//!
//! A listing looks like:
//!
//! ```text
//!   1) 4E3F0B1C9A7D5E2F8B6A0C1D3E5F7A9B1C3D5E7F "Apple Development: Jane Doe (ABCDE12345)"
//!      1 valid identities found
//! ```
//!
//! Every pass over a listing goes through [`parse_listing`]; nothing else in
//! the crate picks quoted names out of `security` output.

/// One code-signing identity from a listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SigningIdentity {
    /// 1-based position reported by `security`.
    pub index: u32,
    /// SHA-1 fingerprint of the certificate, as printed.
    pub fingerprint: String,
    /// Display name without the surrounding quotes.
    pub name: String,
    /// The listing line, trimmed.
    pub raw: String,
}

impl SigningIdentity {
    /// Parses one `N) FINGERPRINT "Name"` line.
    ///
    /// Returns `None` for the summary line and anything else that is not an
    /// identity record.
    pub fn parse_line(line: &str) -> Option<Self> {
        let raw = line.trim();
        let (index, rest) = raw.split_once(')')?;
        let index = index.trim().parse::<u32>().ok()?;

        let rest = rest.trim_start();
        let (fingerprint, rest) = rest.split_once(char::is_whitespace)?;
        if fingerprint.is_empty() || !fingerprint.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }

        // Invalid identities carry a trailing status such as
        // `(CSSMERR_TP_NOT_TRUSTED)` after the closing quote.
        let rest = rest.trim_start().strip_prefix('"')?;
        let end = rest.rfind('"')?;
        let name = &rest[..end];
        if name.is_empty() {
            return None;
        }

        Some(Self {
            index,
            fingerprint: fingerprint.to_string(),
            name: name.to_string(),
            raw: raw.to_string(),
        })
    }

    /// Whether the display name starts with `prefix`, compared literally.
    pub fn matches_prefix(&self, prefix: &str) -> bool {
        self.name.starts_with(prefix)
    }
}

/// All identity records in a listing, in listing order.
pub fn parse_listing(listing: &str) -> Vec<SigningIdentity> {
    listing.lines().filter_map(SigningIdentity::parse_line).collect()
}

/// First identity in listing order whose name starts with `prefix`.
///
/// Several matches are not an error; the first one wins.
pub fn first_match(listing: &str, prefix: &str) -> Option<SigningIdentity> {
    listing
        .lines()
        .filter_map(SigningIdentity::parse_line)
        .find(|identity| identity.matches_prefix(prefix))
}
