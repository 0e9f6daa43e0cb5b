//! Host hook payloads and responses.

pub mod hook_response;

pub use hook_response::{
    HookResponse, HookResponseOptions, HookSpecificOutput, HookType, StopInput,
    build_hook_response, create_hook_response, stop_summary_message,
};
