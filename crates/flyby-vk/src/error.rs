// SPDX-License-Identifier: CEPL-1.0
use std::fmt::Display;

use ash::vk;

/// A Vulkan call that returned a non-success code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{op} failed on {resource}: {code:?} ({})", code.as_raw())]
pub struct VkCallError {
    pub op: &'static str,
    pub resource: String,
    pub code: vk::Result,
}

pub trait VkResultExt<T> {
    /// Tags a raw `ash` result with the operation and the resource it touched.
    fn vk_call(self, op: &'static str, resource: impl Display) -> Result<T, VkCallError>;
}

impl<T> VkResultExt<T> for Result<T, vk::Result> {
    fn vk_call(self, op: &'static str, resource: impl Display) -> Result<T, VkCallError> {
        self.map_err(|code| VkCallError {
            op,
            resource: resource.to_string(),
            code,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_names_op_resource_and_code() {
        let err = Err::<(), _>(vk::Result::ERROR_DEVICE_LOST)
            .vk_call("queue_submit", "frame slot 2")
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("queue_submit"));
        assert!(msg.contains("frame slot 2"));
        assert!(msg.contains("-4"));
        assert_eq!(err.code, vk::Result::ERROR_DEVICE_LOST);
    }

    #[test]
    fn success_passes_through() {
        let v = Ok::<_, vk::Result>(7).vk_call("noop", "none").unwrap();
        assert_eq!(v, 7);
    }
}
