//! 领域层：配置记录、软元件、指令行、工程流索引与角色表（纯数据 + 纯函数）。

pub mod device;
pub mod graph;
pub mod ladder;
pub mod model;
pub mod roles;
