mod registry;
mod topology;

pub use registry::GridTopologyRegistry;
pub use topology::{GridDerivedData, GridSummary, GridTopology, NODE_TOLERANCE, SubGrid};
