//! 核心层：错误、重试策略、会话状态、单飞、计时器、burn-down

pub mod burn;
pub mod error;
pub mod retry;
pub mod single_flight;
pub mod state;
pub mod timer;

pub use burn::{burn_delay, BurnGuard};
pub use error::{ApiError, ChatError, TransportError};
pub use retry::{RetryPolicy, Retryability};
pub use single_flight::SingleFlight;
pub use state::{ChatContext, ClientStatus, SessionState};
pub use timer::TimerSlot;
