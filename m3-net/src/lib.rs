// m3-net/src/lib.rs
pub mod checksum;
pub mod fetch;
pub mod github;
pub mod http;
pub mod validation;

pub use checksum::{
    file_checksum, file_matches, verify_and_purge, Checksum, HashAlgorithm, HashRegistry,
    Verification,
};
pub use fetch::{
    fetch_all, need_list, FetchBatch, FetchRequest, Fetchable, Transport,
};
pub use github::{ContentEntry, Repository};
pub use http::{build_http_client, fetch_remote_spec, HttpTransport};
pub use m3_common::{
    pipeline::{FetchCompletion, FetchSummary, TransferStats},
    {M3Error, Result},
};
pub use validation::validate_url;
