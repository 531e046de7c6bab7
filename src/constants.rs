/// The version of this SDK.
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_BASE_URL: &str = "https://front.bucket.co";
pub const SDK_VERSION_HEADER: &str = "bucket-sdk-version";

pub const FEATURES_PATH: &str = "features";
pub const EVALUATED_FEATURES_PATH: &str = "features/evaluated";
pub const BULK_PATH: &str = "bulk";
pub const EVENT_PATH: &str = "event";

#[cfg(test)]
pub mod test_constants {
    pub const MOCK_SECRET: &str = "sec_test_key";
}
