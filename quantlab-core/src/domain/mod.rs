//! Domain types: symbols, bars, fills, positions, the ledger, snapshots.

pub mod bar;
pub mod fill;
pub mod ids;
pub mod ledger;
pub mod position;
pub mod snapshot;
pub mod symbol;

pub use bar::{BarAnomaly, BarAnomalyKind, PriceBar};
pub use fill::Fill;
pub use ids::RunId;
pub use ledger::Ledger;
pub use position::Position;
pub use snapshot::{
    snapshot_digest, BacktestRun, DayIssue, DayStatus, PortfolioSnapshot, PositionSnapshot,
};
pub use symbol::{Exchange, Symbol, SymbolError};
