//! Least-recently-active ordering for idle eviction.

use std::time::Instant;

use netmux_id::Handle;

#[derive(Debug, Clone, Copy)]
struct Link {
    handle: Handle,
    touched: Instant,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Intrusive list over handle-table slots, oldest activity at the head.
#[derive(Debug, Default)]
pub(crate) struct IdleList {
    links: Vec<Option<Link>>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl IdleList {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Records activity: moves `handle` to the tail with a fresh timestamp.
    pub fn touch(&mut self, handle: Handle, now: Instant) {
        let slot = handle.slot();
        self.remove(slot);
        if self.links.len() <= slot {
            self.links.resize(slot + 1, None);
        }
        self.links[slot] = Some(Link {
            handle,
            touched: now,
            prev: self.tail,
            next: None,
        });
        match self.tail {
            Some(t) => {
                if let Some(link) = self.links[t].as_mut() {
                    link.next = Some(slot);
                }
            }
            None => self.head = Some(slot),
        }
        self.tail = Some(slot);
        self.len += 1;
    }

    /// Unlinks whatever occupies `slot`. No-op if nothing does.
    pub fn remove(&mut self, slot: usize) {
        let Some(link) = self.links.get_mut(slot).and_then(Option::take) else {
            return;
        };
        match link.prev {
            Some(p) => {
                if let Some(prev) = self.links[p].as_mut() {
                    prev.next = link.next;
                }
            }
            None => self.head = link.next,
        }
        match link.next {
            Some(n) => {
                if let Some(next) = self.links[n].as_mut() {
                    next.prev = link.prev;
                }
            }
            None => self.tail = link.prev,
        }
        self.len -= 1;
    }

    /// Least recently active entry.
    pub fn front(&self) -> Option<(Handle, Instant)> {
        let link = self.links[self.head?].as_ref()?;
        Some((link.handle, link.touched))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netmux_id::HandleTable;
    use std::time::Duration;

    fn handles(n: usize) -> Vec<Handle> {
        let mut table = HandleTable::new();
        (0..n).map(|_| table.insert(()).unwrap()).collect()
    }

    #[test]
    fn test_touch_moves_to_tail() {
        let h = handles(3);
        let t0 = Instant::now();
        let mut idle = IdleList::new();
        for (i, handle) in h.iter().enumerate() {
            idle.touch(*handle, t0 + Duration::from_secs(i as u64));
        }
        assert_eq!(idle.front().unwrap().0, h[0]);

        idle.touch(h[0], t0 + Duration::from_secs(10));
        assert_eq!(idle.front().unwrap().0, h[1]);
        assert_eq!(idle.len(), 3);
    }

    #[test]
    fn test_remove_relinks() {
        let h = handles(3);
        let now = Instant::now();
        let mut idle = IdleList::new();
        for handle in &h {
            idle.touch(*handle, now);
        }
        idle.remove(h[0].slot());
        assert_eq!(idle.front().unwrap().0, h[1]);
        idle.remove(h[1].slot());
        idle.remove(h[1].slot());
        assert_eq!(idle.front().unwrap().0, h[2]);
        idle.remove(h[2].slot());
        assert!(idle.front().is_none());
        assert_eq!(idle.len(), 0);

        // Removing an untracked slot is harmless.
        idle.remove(999);
    }
}
