//! Vive stream wire messages.
//!
//! Protobuf schema (package `dexcap`), kept field-for-field so any peer built from the same
//! `.proto` can talk to us:
//!
//! ```text
//! message TrackerPose { string role = 1; double px = 2; double py = 3; double pz = 4;
//!                       double qw = 5; double qx = 6; double qy = 7; double qz = 8; }
//! message ViveFrame   { uint64 timestamp_ns = 1; repeated TrackerPose trackers = 2; }
//! ```
//!
//! The same structs double as the JSON shape published by the receiver.

use prost::bytes::{Buf, BufMut};
use prost::encoding::{double, skip_field, string, DecodeContext, WireType};
use prost::DecodeError;
use serde::{Deserialize, Serialize};

/// Identity quaternion `(w, x, y, z)`.
pub const IDENTITY_ORIENTATION: [f64; 4] = [1.0, 0.0, 0.0, 0.0];

/// One tracked rigid body's pose at a frame instant.
/// Position is in tracking-space meters; orientation is a `w, x, y, z` quaternion.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerPose {
    pub role: String,
    pub px: f64,
    pub py: f64,
    pub pz: f64,
    pub qw: f64,
    pub qx: f64,
    pub qy: f64,
    pub qz: f64,
}

const ROLE_TAG: u32 = 1;
/// Tags of `px, py, pz, qw, qx, qy, qz`, in that order.
const COMPONENT_TAGS: [u32; 7] = [2, 3, 4, 5, 6, 7, 8];

// Written out by hand: the derive skips a double whenever it compares equal to 0.0, which
// turns -0.0 into +0.0. Here a double is omitted only when its bits are all zero.
impl prost::Message for TrackerPose {
    fn encode_raw(&self, buf: &mut impl BufMut) {
        if !self.role.is_empty() {
            string::encode(ROLE_TAG, &self.role, buf);
        }
        for (tag, value) in COMPONENT_TAGS.into_iter().zip(self.components()) {
            if value.to_bits() != 0 {
                double::encode(tag, &value, buf);
            }
        }
    }

    fn merge_field(
        &mut self,
        tag: u32,
        wire_type: WireType,
        buf: &mut impl Buf,
        ctx: DecodeContext,
    ) -> Result<(), DecodeError> {
        let field = match tag {
            ROLE_TAG => {
                return string::merge(wire_type, &mut self.role, buf, ctx).map_err(|mut e| {
                    e.push("TrackerPose", "role");
                    e
                })
            }
            2 => &mut self.px,
            3 => &mut self.py,
            4 => &mut self.pz,
            5 => &mut self.qw,
            6 => &mut self.qx,
            7 => &mut self.qy,
            8 => &mut self.qz,
            _ => return skip_field(wire_type, tag, buf, ctx),
        };
        double::merge(wire_type, field, buf, ctx)
    }

    fn encoded_len(&self) -> usize {
        let role = if self.role.is_empty() {
            0
        } else {
            string::encoded_len(ROLE_TAG, &self.role)
        };
        role + COMPONENT_TAGS
            .into_iter()
            .zip(self.components())
            .filter(|(_, value)| value.to_bits() != 0)
            .map(|(tag, value)| double::encoded_len(tag, &value))
            .sum::<usize>()
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

impl TrackerPose {
    pub fn new(role: impl Into<String>, position: [f64; 3], orientation: [f64; 4]) -> Self {
        let [px, py, pz] = position;
        let [qw, qx, qy, qz] = orientation;
        Self {
            role: role.into(),
            px,
            py,
            pz,
            qw,
            qx,
            qy,
            qz,
        }
    }

    pub fn position(&self) -> [f64; 3] {
        [self.px, self.py, self.pz]
    }

    pub fn orientation(&self) -> [f64; 4] {
        [self.qw, self.qx, self.qy, self.qz]
    }

    fn components(&self) -> [f64; 7] {
        [self.px, self.py, self.pz, self.qw, self.qx, self.qy, self.qz]
    }
}

/// One sampled instant: a timestamp plus the trackers observed in that tick, in
/// observation order. Consumers should key trackers by `role`, not index.
#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
pub struct Frame {
    /// Nanoseconds since a producer-chosen epoch; non-decreasing per connection.
    #[prost(uint64, tag = "1")]
    pub timestamp_ns: u64,
    #[prost(message, repeated, tag = "2")]
    pub trackers: Vec<TrackerPose>,
}

impl Frame {
    pub fn new(timestamp_ns: u64, trackers: Vec<TrackerPose>) -> Self {
        Self {
            timestamp_ns,
            trackers,
        }
    }

    /// First tracker with the given role.
    pub fn tracker(&self, role: &str) -> Option<&TrackerPose> {
        self.trackers.iter().find(|t| t.role == role)
    }

    pub fn is_empty(&self) -> bool {
        self.trackers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracker_lookup_by_role() {
        let frame = Frame::new(
            7,
            vec![
                TrackerPose::new("chest", [0.0, 1.0, 2.0], IDENTITY_ORIENTATION),
                TrackerPose::new("right_elbow", [3.0, 4.0, 5.0], IDENTITY_ORIENTATION),
            ],
        );
        let elbow = frame.tracker("right_elbow").unwrap();
        assert_eq!(elbow.position(), [3.0, 4.0, 5.0]);
        assert_eq!(elbow.orientation(), IDENTITY_ORIENTATION);
        assert!(frame.tracker("left_elbow").is_none());
    }

    #[test]
    fn json_field_names() {
        let frame = Frame::new(
            42,
            vec![TrackerPose::new("chest", [0.5, -1.0, 2.0], [1.0, 0.0, 0.0, 0.0])],
        );
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["timestamp_ns"], 42);
        let t = &value["trackers"][0];
        assert_eq!(t["role"], "chest");
        assert_eq!(t["px"], 0.5);
        assert_eq!(t["py"], -1.0);
        assert_eq!(t["pz"], 2.0);
        assert_eq!(t["qw"], 1.0);
        assert_eq!(t["qx"], 0.0);
        assert_eq!(t["qy"], 0.0);
        assert_eq!(t["qz"], 0.0);
    }
}
