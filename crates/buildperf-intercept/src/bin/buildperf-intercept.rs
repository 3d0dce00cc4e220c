//! Compiler wrapper: measures the compile command it stands in for.

use buildperf_core::model::Category;

fn main() {
    buildperf_intercept::run_tool(Category::Compile, "buildperf-intercept");
}
