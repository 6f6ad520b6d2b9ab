pub mod network {
    pub const TIMEOUT_API_REQUEST_MS: u64 = 30_000;
    pub const MAX_CAPTURE_BYTES: usize = 10 * 1024 * 1024;
    pub const ERROR_PREVIEW_CHARS: usize = 256;
    pub const USER_AGENT: &str = concat!("gateway/", env!("CARGO_PKG_VERSION"));
}

pub mod paths {
    pub const MAX_DEPTH: usize = 10;
    pub const MAX_WILDCARD_MATCHES: usize = 5_000;
}

pub mod retry {
    pub const MAX_ATTEMPTS: u32 = 3;
    pub const BASE_DELAY_MS: u64 = 250;
    pub const MAX_DELAY_MS: u64 = 5_000;
    pub const JITTER: f64 = 0.2;
    /// Retry-After hints beyond this fail the call instead of sleeping.
    pub const MAX_RETRY_AFTER_MS: u64 = 60_000;
    pub const STATUS_CODES: &[u16] = &[408, 429, 500, 502, 503, 504];
}

pub mod pagination {
    pub const MAX_PAGES: usize = 10;
    pub const PAGE_SIZE: usize = 100;
    pub const MAX_ITEMS: usize = 10_000;
    pub const START_PAGE: u64 = 1;
    pub const MIN_DETECTION_CONFIDENCE: f64 = 0.1;
}

pub mod circuit {
    pub const FAILURE_THRESHOLD: u32 = 5;
    pub const FAILURE_WINDOW_MS: u64 = 60_000;
    pub const RESET_TIMEOUT_MS: u64 = 30_000;
    pub const SUCCESS_THRESHOLD: u32 = 2;
}

pub mod validation {
    pub const TIMEOUT_MS: u64 = 5_000;
    pub const MAX_ISSUES: usize = 100;
}

pub mod drift {
    pub const WINDOW_SIZE: usize = 20;
    pub const MIN_SAMPLES: usize = 5;
    pub const FAILURE_RATIO: f64 = 0.5;
}

pub mod store {
    pub const SNAPSHOT_VERSION: u32 = 1;
    pub const FILE_MODE: u32 = 0o600;
}
