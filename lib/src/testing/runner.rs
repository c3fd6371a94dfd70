// Executes a single test function and logs its outcome.

use super::TestResult;

pub fn run_single_test(name: &str, test_fn: impl FnOnce() -> TestResult) -> TestResult {
    let result = test_fn();
    match result {
        TestResult::Pass => crate::klog_debug!("TEST PASS: {}", name),
        TestResult::Fail | TestResult::Panic => crate::klog_info!("TEST FAIL: {}", name),
        TestResult::Skipped => crate::klog_debug!("TEST SKIP: {}", name),
    }
    result
}
