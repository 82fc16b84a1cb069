//! Terminal outcome of one instance's repair run

use crate::instance::InstanceId;
use serde::{Deserialize, Serialize};

/// Terminal record per instance, written once and never modified
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairResult {
    /// Instance the result belongs to
    pub instance_id: InstanceId,

    /// Whether some candidate reproduced the reference rows
    pub success: bool,

    /// Text of the last candidate, whether it matched or not
    pub final_response: String,

    /// Number of repair steps consumed
    #[serde(default)]
    pub steps: usize,
}
