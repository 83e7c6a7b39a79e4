/// The region a bucket lives in when the store reports none.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Normalize a location token returned by the store into a signing region.
///
/// The store reports the default region either as an empty location or as
/// the legacy `US` token; both mean `us-east-1`. The legacy `EU` token means
/// `eu-west-1`.
pub fn normalize_region(location: &str) -> String {
    match location.trim() {
        "" | "US" => DEFAULT_REGION.to_string(),
        "EU" => "eu-west-1".to_string(),
        other => other.to_string(),
    }
}

/// Whether `region` names the default region.
pub fn is_default_region(region: &str) -> bool {
    normalize_region(region) == DEFAULT_REGION
}
