//! Data sources.

pub mod fargate_workload_agent;

pub use fargate_workload_agent::{
    FargateWorkloadAgent, FargateWorkloadAgentDataSource, FARGATE_WORKLOAD_AGENT_DATA_SOURCE,
    PATCH_ERROR_SUMMARY,
};
