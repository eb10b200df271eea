/*!
# OLTWatch DevKit - Fakes and fixtures for poller tests

Helpers for exercising the kernel without real OLTs:
- Scripted session client with concurrency instrumentation
- CLI output fixtures in the shapes the extractors expect
- Flaky store wrapper and a ready-wired test harness
*/

pub mod fixtures;
pub mod session_stub;
pub mod test_utils;

pub use session_stub::MockSessionClient;
pub use test_utils::{FlakyStore, TestHarness};
