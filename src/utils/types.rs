use std::collections::HashMap;

/// host:port of a node's gRPC endpoint; node ids are derived from it
pub type Address = String;

/// storage key, the certificate's common name
pub type Key = String;

/// in-memory certificate store, common name to PEM bytes
pub type KvStore = HashMap<Key, Vec<u8>>;
