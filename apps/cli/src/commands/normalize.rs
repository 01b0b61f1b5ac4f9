//! Normalize command implementation.

use lumen_resources::normalize;

/// Execute the normalize command.
///
/// Prints one canonical key per line, in input order.
pub fn execute(locators: &[String]) {
    for locator in locators {
        println!("{}", normalize(locator));
    }
}
