//! Simulator link — a subscription registry over the vendor telemetry channel.

pub mod channel;
pub mod decode;
pub mod link;
pub mod session;

pub type ObjectId = u32;
pub type ModelId = u32;
pub type RequestId = u32;
pub type EventId = u32;
pub type GroupId = u32;
pub type PacketId = u32;

/// The user aircraft's well-known object handle.
pub const OBJECT_ID_USER: ObjectId = 0;
pub const DEFAULT_GROUP: GroupId = 0;

/// Delivery cadence of a data request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPeriod {
    Never,
    Once,
    VisualFrame,
    SimFrame,
    Second,
}

impl RequestPeriod {
    /// Repeating requests persist until cancelled; the rest auto-expire.
    pub fn is_repeatable(self) -> bool {
        matches!(self, Self::VisualFrame | Self::SimFrame | Self::Second)
    }
}

/// Simulator object class, as used by type queries and add/remove events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectType {
    User,
    All,
    Aircraft,
    Helicopter,
    Boat,
    Ground,
}

/// Binary layout element of a telemetry schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    I32,
    I64,
    F32,
    F64,
    Str8,
    Str32,
    Str64,
    Str128,
    Str256,
    Str260,
    StrV,
    InitPosition,
    MarkerState,
    Waypoint,
    LatLonAlt,
    Xyz,
}

/// One variable of a telemetry schema.
#[derive(Debug, Clone, Copy)]
pub struct VarDef {
    pub kind: VarKind,
    pub name: &'static str,
    pub unit: Option<&'static str>,
}

/// A named telemetry schema. `model_id` is zero until registration succeeds
/// and reverts to zero when registration fails.
#[derive(Debug)]
pub struct DataModel {
    pub name: &'static str,
    pub vars: &'static [VarDef],
    pub model_id: ModelId,
}

impl DataModel {
    pub const fn new(name: &'static str, vars: &'static [VarDef]) -> Self {
        Self {
            name,
            vars,
            model_id: 0,
        }
    }
}
