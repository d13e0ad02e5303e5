//! Domain tools available to the assistant during a call

pub mod eligibility;

pub use eligibility::{check_eligibility, EligibilityCheckTool, EligibilityResult, EligibilityStatus};

use crate::registry::ToolRegistry;

/// Register every domain tool under each name assistants may use
pub fn register_domain_tools(registry: &mut ToolRegistry) {
    registry.register(EligibilityCheckTool::new());
    registry.register(EligibilityCheckTool::legacy());
}
