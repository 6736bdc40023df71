use serde::{Deserialize, Serialize};

/// Transaction handle of an import.
///
/// Opaque to the pipeline: it is passed unchanged to every value codec call
/// and to the final segment load, and its id is stamped into segment footers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxnHandle {
    id: u64,
}

impl TxnHandle {
    pub fn new(id: u64) -> TxnHandle {
        TxnHandle { id }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl std::fmt::Display for TxnHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "txn-{}", self.id)
    }
}
