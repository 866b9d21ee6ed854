//! Positional partitioning of rooms into controller-sized batches

use cu_types::RoomId;

/// Split `rooms` into consecutive batches of at most `capacity` rooms.
///
/// Batching follows the order of `rooms` only. Previous assignments are not
/// taken into account, so reordering the input moves rooms between batches.
///
/// # Panics
///
/// Panics if `capacity` is zero; the configuration is validated at startup.
pub fn partition(rooms: &[RoomId], capacity: usize) -> Vec<Vec<RoomId>> {
    assert!(capacity > 0, "controller capacity must be at least 1");
    rooms.chunks(capacity).map(<[RoomId]>::to_vec).collect()
}

/// Drop repeated ids, keeping the first occurrence of each.
pub fn dedup_preserving_order(rooms: &[RoomId]) -> Vec<RoomId> {
    let mut seen = std::collections::HashSet::with_capacity(rooms.len());
    rooms.iter().copied().filter(|id| seen.insert(*id)).collect()
}
