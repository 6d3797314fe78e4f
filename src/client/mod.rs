//! 调用方使用的客户端：组合限速门、进程监管、重试控制与类型化结果

pub mod facade;
pub mod types;

pub use facade::MatClient;
pub use types::{
    MaterialSummary, MoireInfo, MoireOptions, RenderedImage, StructureData, StructureInfo, SupercellInfo,
};

pub use crate::store::{structure_id_from_uri, structure_uri};
pub use crate::structure::supercell::ScalingSpec;
pub use crate::tools::export::StructureFormat;
