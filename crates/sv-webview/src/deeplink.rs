//! Query parameters a native host or a payment provider hands to the page.

use url::form_urlencoded;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeepLink {
    pub source: Option<String>,
    pub token: Option<String>,
    /// Payment reference; `reference` wins over the provider's `trxref`.
    pub reference: Option<String>,
    pub share_id: Option<String>,
    pub quantity: Option<String>,
}

impl DeepLink {
    /// Parse `location.search`. Blank values count as absent and the first
    /// occurrence of a repeated key wins.
    pub fn parse(query: &str) -> Self {
        let mut link = DeepLink::default();
        let mut trxref = None;

        for (key, value) in form_urlencoded::parse(query.trim_start_matches('?').as_bytes()) {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            let slot = match &*key {
                "source" => &mut link.source,
                "token" => &mut link.token,
                "reference" => &mut link.reference,
                "trxref" => &mut trxref,
                "share_id" => &mut link.share_id,
                "quantity" => &mut link.quantity,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.to_owned());
            }
        }

        if link.reference.is_none() {
            link.reference = trxref;
        }
        link
    }
}

/// Same-origin absolute path (`/wallet`, not `//evil.example` or `https://...`).
pub fn is_local_path(path: &str) -> bool {
    path.starts_with('/') && !path.starts_with("//") && !path.contains('\\')
}
