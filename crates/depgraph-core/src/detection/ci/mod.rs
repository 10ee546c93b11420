pub mod flow;
pub mod gitlab;

pub use flow::{detect_flows, flow_to_edge, FlowPattern, JobScripts, PartialFlow, ScorerWeights, ScoredFlow, TransformationKind};
pub use gitlab::{classify_script_line, detect_file as detect_gitlab_file, parse_helm_invocation, HelmInvocation, ScriptToolUse};
