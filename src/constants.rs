//! Store-side naming conventions and tuning defaults shared by every channel.

/// Separator placed between a table name and a key (`TABLE:key`).
pub const DEFAULT_TABLE_NAME_SEPARATOR: &str = ":";

/// Suffix of the pending-key index kept by the compacting channel.
pub const KEY_SET_SUFFIX: &str = "_KEY_SET";

/// Suffix of the wakeup channel both queue-backed channels publish to.
pub const CHANNEL_SUFFIX: &str = "_CHANNEL";

/// Suffix of the FIFO message queue kept by the ordered channel.
pub const KEY_VALUE_OP_QUEUE_SUFFIX: &str = "_KEY_VALUE_OP_QUEUE";

/// Prefix of the staging rows written by the compacting producer.
pub const STATE_TABLE_PREFIX: &str = "_";

/// Keys popped per atomic step when draining a backlog.
pub const DEFAULT_POP_BATCH_SIZE: usize = 128;

/// Upper bound for a single atomic pop step.
pub const MAX_POP_BATCH_SIZE: usize = 1024;

pub(crate) const SET_COMMAND: &str = "SET";
pub(crate) const DEL_COMMAND: &str = "DEL";

/// Reason attached to errors raised while the store is still loading its dataset.
pub(crate) const LOADING_REASON: &str = "LOADING dataset is being loaded into memory";

