pub mod halt;
pub mod instance;
pub mod tick;
pub mod tree;

pub use instance::{NodeMemory, ProfileCounters, TreeInstance};
pub use tick::{tick, TickContext};
pub use tree::{CompiledNode, CompiledTree, KeyedArgs, LeafArg, NodeKind, Status};
