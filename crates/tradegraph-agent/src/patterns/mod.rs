//! Control patterns built on the graph executor.

pub mod debate;
pub mod selection;
pub mod tournament;

pub use debate::{connect_debate, Speaker, TurnNode};
pub use selection::{connect_selection, SelectionNode};
pub use tournament::{Tournament, TournamentResult};
