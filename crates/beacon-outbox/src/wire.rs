//! Typed event payloads.

use crate::OutboxResult;
use serde::Serialize;

/// Renders a typed record as the JSON payload of an event.
///
/// Every `Serialize` type gets this through `serde_json`. Types that are not
/// `Serialize` can implement it by hand.
pub trait ToWireFormat {
    fn to_wire_format(&self) -> OutboxResult<String>;
}

impl<T: Serialize + ?Sized> ToWireFormat for T {
    fn to_wire_format(&self) -> OutboxResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}
