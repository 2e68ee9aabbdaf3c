pub mod cache;
pub mod history;
pub mod oracles;
pub mod refresh;

pub use cache::PortfolioCache;
pub use history::HistoryBuffer;
pub use refresh::{RefreshCoordinator, RefreshError};
pub use self::oracles::{DataApiPositionsOracle, Erc20BalanceOracle};
