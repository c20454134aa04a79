use serde::{Deserialize, Serialize};

/// Per-compilation options. All flags default to off, i.e. every warning
/// category is reported unless a project opts out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompilerOptions {
    pub ignore_unused_constants_warnings: bool,
    pub ignore_unused_variables_warnings: bool,
    pub ignore_unused_fields_warnings: bool,
    pub ignore_unused_private_functions_warnings: bool,
    pub ignore_update_fields_check_warnings: bool,
    pub ignore_check_external_caller_warnings: bool,
}
