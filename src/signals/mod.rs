//! Signal Lifecycle & Locking
//!
//! Immutable signal architecture: append-only history, market and entry
//! snapshots, action-freeze windows, and the three-wave state machine.

pub mod lifecycle;
pub mod manager;
pub mod types;

pub use lifecycle::{
    check_stability, evaluate_primary_market, should_publish, wave_timing, GameInfo, MarketQuotes,
    WaveTiming,
};
pub use manager::{NewSignal, SignalManager, SignalManagerConfig};
pub use types::{
    classify_state, EntrySnapshot, GateEvaluation, GateResult, MarketSnapshot, MoneylineQuote,
    RobustnessLabel, Signal, SignalDelta, SignalIntent, SignalRun, SignalState, SignalWave,
    SpreadQuote, TotalQuote,
};
