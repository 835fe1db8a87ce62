use crate::LaneStructure;
#[cfg(feature = "debug")]
use crate::{Key, RecordId};
#[cfg(feature = "debug")]
use serde_json::json;

#[cfg(feature = "debug")]
thread_local!(
    static DEBUG_FRAME: std::cell::RefCell<Vec<serde_json::Value>> = Default::default();
);

#[cfg(feature = "debug")]
fn key(id: RecordId) -> u64 {
    id.data().as_ffi()
}

/// Pushes a snapshot of a lane structure onto the current debug frame.
#[allow(unused)]
pub fn debug_structure(structure: &LaneStructure) {
    #[cfg(feature = "debug")]
    DEBUG_FRAME.with(|frame| {
        let records: Vec<_> = structure
            .records()
            .map(|rec| {
                json!({
                    "id": key(rec.id()),
                    "lane": rec.lane_id().data().as_ffi(),
                    "relative_lane": structure.relative_lane(rec.id()).map(|lane| lane.offset()),
                    "start_distance": structure.start_distance(rec.id()).ok(),
                    "length": rec.length(),
                    "next": rec.next().iter().map(|id| key(*id)).collect::<Vec<_>>(),
                    "prev": rec.prev().iter().map(|id| key(*id)).collect::<Vec<_>>(),
                    "left": rec.left().map(key),
                    "right": rec.right().map(key),
                    "cut_off_start": rec.cut_off_start(),
                    "cut_off_end": rec.cut_off_end(),
                })
            })
            .collect();
        frame.borrow_mut().push(json!({
            "type": "structure",
            "root": structure.root_record().ok().map(|rec| key(rec.id())),
            "records": records,
            "upstream_edge": structure.upstream_edge().map(|rec| key(rec.id())).collect::<Vec<_>>(),
            "downstream_edge": structure.downstream_edge().map(|rec| key(rec.id())).collect::<Vec<_>>(),
        }))
    })
}

/// Takes every snapshot pushed on this thread since the last call.
#[cfg(feature = "debug")]
pub fn take_debug_frame() -> serde_json::Value {
    json!(DEBUG_FRAME.with(|frame| frame.take()))
}
