//! Linker wrapper: measures the link command it stands in for.

use buildperf_core::model::Category;

fn main() {
    buildperf_intercept::run_tool(Category::Link, "buildperf-intercept-ld");
}
