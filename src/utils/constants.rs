pub static MAX_CONNECT_RETRIES: u64 = 15;
pub static CONNECTION_RETRY_SLEEP_MILLIS: u64 = 100;

pub static DEBUG_RPCS_UNAVAILABLE_ERROR_MESSAGE: &str =
    "diagnostic RPCs are only served when the node runs with --dev";
