//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Floor and room naming for classrooms in the FUB building."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use cems_common::ClassroomId;
use serde::Serialize;

/// Rooms per floor on the regular floors.
pub const ROOMS_PER_FLOOR: u32 = 4;
/// Floors 1..=7 hold four rooms each; everything after lands on floor 8.
pub const REGULAR_FLOORS: u32 = 7;
pub const TOP_FLOOR: u32 = REGULAR_FLOORS + 1;
const BUILDING_PREFIX: &str = "FUB";

/// Where a classroom sits in the building.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassroomInfo {
    pub classroom_id: ClassroomId,
    pub floor: u32,
    /// 1-based room index within the floor.
    pub room: u32,
    /// e.g. `FUB-203`.
    pub name: String,
}

/// Locate a classroom.
pub fn classroom_info(id: ClassroomId) -> ClassroomInfo {
    let raw = id.get();
    let regular_rooms = ROOMS_PER_FLOOR * REGULAR_FLOORS;
    let (floor, room) = if raw <= regular_rooms {
        let floor = raw.div_ceil(ROOMS_PER_FLOOR);
        (floor, raw - (floor - 1) * ROOMS_PER_FLOOR)
    } else {
        (TOP_FLOOR, raw - regular_rooms)
    };
    ClassroomInfo {
        classroom_id: id,
        floor,
        room,
        name: format!("{BUILDING_PREFIX}-{floor}{room:02}"),
    }
}

/// Classrooms on `floor`, limited to ids `1..=classroom_count`.
pub fn classrooms_on_floor(floor: u32, classroom_count: u32) -> Vec<ClassroomId> {
    (1..=classroom_count)
        .filter_map(|raw| ClassroomId::new(raw).ok())
        .filter(|id| classroom_info(*id).floor == floor)
        .collect()
}
