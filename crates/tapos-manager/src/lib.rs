//! Per-chain TAPOS freshness poller.
//!
//! Maintains, for every configured chain, the freshest reference-block
//! metadata (`ref_block_num`/`ref_block_prefix`) a device needs to stamp a
//! transaction, by continuously polling a rotating, error-aware pool of
//! that chain's API hosts (§4.5).
//!
//! Grounded on the teacher's `crates/relayer` outbound-polling shape: one
//! shared `reqwest::Client`, one independent state machine per logical
//! peer (here, per chain), each re-arming its own timer after every tick.

#![forbid(unsafe_code)]

mod manager;
mod poll;
mod pool;
mod state;

pub use manager::TaposManager;
pub use poll::poll_get_info;
pub use pool::{ApiHost, ApiPool, ApiPoolEntry};
pub use state::{ChainState, ChainStateSummary, TaposSnapshot};
