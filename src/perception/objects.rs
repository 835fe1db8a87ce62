use std::marker::PhantomData;

use smallvec::smallvec;

use super::{Entry, Found, LaneSearch};
use crate::{LaneRecord, Network, ObjectId, ObjectKind, Perceivable};

/// A perceived static object of kind `K`.
pub type PerceivedObject<'n, K> = Entry<(ObjectId, &'n K)>;

/// Searches for the static objects of kind `K` on a lane.
pub struct LaneObjects<'n, K: ?Sized> {
    network: &'n Network,
    _kind: PhantomData<fn() -> &'n K>,
}

impl<'n, K: ?Sized> Clone for LaneObjects<'n, K> {
    fn clone(&self) -> Self {
        Self {
            network: self.network,
            _kind: PhantomData,
        }
    }
}

impl<'n, K: Perceivable + ?Sized> LaneObjects<'n, K> {
    pub fn new(network: &'n Network) -> Self {
        Self {
            network,
            _kind: PhantomData,
        }
    }
}

impl<'n, K: Perceivable + ?Sized + 'n> LaneSearch for LaneObjects<'n, K> {
    type Object = (ObjectId, &'n K);
    type Counter = usize;

    fn probe(
        &self,
        record: &LaneRecord,
        position: f64,
        counter: Option<&usize>,
        downstream: bool,
    ) -> Option<Found<Self::Object, usize>> {
        let network = self.network;
        let ids = network.lane(record.lane_id())?.objects();
        let (dir, length) = (record.direction(), record.length());
        let count = ids.len();
        // objects are stored in design-line order
        let forward = dir.is_plus() == downstream;
        let nth = |k: usize| -> Option<(f64, ObjectId, &'n ObjectKind)> {
            let id = ids[if forward { k } else { count - 1 - k }];
            let object = network.object(id)?;
            Some((dir.along(object.pos(), length), id, object.kind()))
        };
        let beyond = |along: f64| match downstream {
            true => along > position,
            false => along < position,
        };

        let mut k = match counter {
            Some(k) => *k,
            None => {
                let mut k = 0;
                while k < count && !beyond(nth(k)?.0) {
                    k += 1;
                }
                k
            }
        };
        let (at, first) = loop {
            if k >= count {
                return None;
            }
            let (along, id, kind) = nth(k)?;
            k += 1;
            if let Some(object) = K::select(kind) {
                break (along, (id, object));
            }
        };
        let mut objects = smallvec![first];
        while k < count {
            let (along, id, kind) = nth(k)?;
            if along != at {
                break;
            }
            k += 1;
            if let Some(object) = K::select(kind) {
                objects.push((id, object));
            }
        }
        Some(Found {
            objects,
            position: at,
            counter: k,
        })
    }
}
