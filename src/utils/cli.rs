use std::path::PathBuf;

use clap::Parser;

use crate::utils::types::Address;

#[derive(Parser, Debug)]
#[command(name = "certring", about = "Chord DHT node storing X.509 certificates by common name")]
pub struct Cli {
    /// address the chord gRPC service binds to, e.g. 127.0.0.1:5601
    #[arg(long)]
    pub grpc: Address,

    /// address the HTTP client API binds to, e.g. 127.0.0.1:5501
    #[arg(long)]
    pub web: Address,

    /// gRPC address of a node in an existing ring; without it a new ring is started
    #[arg(long)]
    pub peer: Option<Address>,

    /// INI file overriding ring parameters, intervals and timeouts
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// serve diagnostic RPCs such as node summaries
    #[arg(long, default_value_t = false)]
    pub dev: bool,
}
