//! Playwright emitter: page-driving skeleton with the starting state as setup notes

use super::{comment_safe, ts_string, ScaffoldPlan};

pub fn emit(plan: &ScaffoldPlan) -> String {
    let mut out = String::new();
    out.push_str("import { test, expect } from '@playwright/test';\n\n");
    out.push_str(&plan.header());
    out.push_str(&format!("test.describe({}, () => {{\n", ts_string(&plan.suite_name())));

    out.push_str("  test.beforeEach(async ({ page }) => {\n");
    match &plan.starting_state {
        Some(state) => {
            out.push_str("    // Starting state\n");
            if let Some(view) = &state.view {
                out.push_str(&format!("    //   view: {}\n", comment_safe(view)));
            }
            if let Some(data) = &state.data_loaded {
                out.push_str(&format!("    //   data loaded: {}\n", comment_safe(data)));
            }
            if let Some(context) = &state.context {
                out.push_str(&format!("    //   context: {}\n", comment_safe(context)));
            }
        }
        None => out.push_str("    // No starting state recorded\n"),
    }
    out.push_str("    await page.goto('/');\n");
    out.push_str("  });\n");

    for case in &plan.cases {
        out.push('\n');
        if plan.placeholder {
            out.push_str(&format!("  test.fixme({}, async () => {{}});\n", ts_string(case)));
            continue;
        }
        out.push_str(&format!("  test({}, async ({{ page }}) => {{\n", ts_string(case)));
        out.push_str("    // Steps\n\n");
        out.push_str("    // Expectation\n");
        out.push_str("    await expect(page).toHaveTitle(/.+/);\n");
        out.push_str("  });\n");
    }

    out.push_str("});\n");
    out
}
