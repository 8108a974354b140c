//! Vitest emitter: one `it` per success criterion with plain assertions

use super::{ts_string, ScaffoldPlan};

pub fn emit(plan: &ScaffoldPlan) -> String {
    let mut out = String::new();
    out.push_str("import { describe, it, expect } from 'vitest';\n\n");
    out.push_str(&plan.header());
    out.push_str(&format!("describe({}, () => {{\n", ts_string(&plan.suite_name())));

    for (i, case) in plan.cases.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        if plan.placeholder {
            out.push_str(&format!("  it.todo({});\n", ts_string(case)));
            continue;
        }
        out.push_str(&format!("  it({}, () => {{\n", ts_string(case)));
        out.push_str("    // Arrange\n\n");
        out.push_str("    // Act\n\n");
        out.push_str("    // Assert\n");
        out.push_str("    expect(true).toBe(false);\n");
        out.push_str("  });\n");
    }

    out.push_str("});\n");
    out
}
