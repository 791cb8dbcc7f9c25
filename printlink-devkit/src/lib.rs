/*!
# printlink devkit - test doubles for printer development

Lets protocol code run without a printer or broker:
- `MockTransport` records subscriptions and publishes, with connected,
  failure and delay toggles
- `ReportBuilder` builds `print` reports the way the firmware shapes them
- `TestHarness` wires a synchroniser, dispatcher and reader to the mock
*/

pub mod mock_transport;
pub mod reports;
pub mod test_utils;

pub use anyhow;
pub use mock_transport::{MockMessage, MockTransport};
pub use reports::{storage_unit, ReportBuilder, TrayBuilder};
pub use test_utils::{init_tracing, TestHarness, TestStats};
