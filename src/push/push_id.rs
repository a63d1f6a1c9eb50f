use rand::Rng;
use std::sync::{LazyLock, Mutex};

// URL-safe base64 variant ordered by ASCII so ids sort chronologically.
const ID_CHARS: &[u8; 64] = b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

struct IdState {
    last_millis: u64,
    last_rand: [u8; 12],
}

static ID_STATE: LazyLock<Mutex<IdState>> = LazyLock::new(|| {
    Mutex::new(IdState {
        last_millis: 0,
        last_rand: [0; 12],
    })
});

/// Mints a 20-character push id: 8 timestamp characters followed by 12
/// random characters. Two ids minted in the same millisecond increment the
/// random suffix instead of re-rolling it, so ids stay unique and keep
/// sorting in mint order.
pub(crate) fn next_push_id(mut now: u64) -> String {
    let mut state = ID_STATE.lock().unwrap();
    let same_millis = now == state.last_millis;
    state.last_millis = now;

    let mut stamp = [0u8; 8];
    for slot in stamp.iter_mut().rev() {
        *slot = ID_CHARS[(now % 64) as usize];
        now /= 64;
    }
    debug_assert!(now == 0, "timestamp exceeded eight base64 characters");

    if same_millis {
        let mut index = state.last_rand.len();
        while index > 0 && state.last_rand[index - 1] == 63 {
            state.last_rand[index - 1] = 0;
            index -= 1;
        }
        if index > 0 {
            state.last_rand[index - 1] += 1;
        }
    } else {
        let mut rng = rand::thread_rng();
        for slot in state.last_rand.iter_mut() {
            *slot = rng.gen_range(0..64);
        }
    }

    let mut id = String::with_capacity(20);
    for &ch in &stamp {
        id.push(ch as char);
    }
    for &index in &state.last_rand {
        id.push(ID_CHARS[index as usize] as char);
    }
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    // The random suffix state is process-global, so these assertions stick
    // to what the timestamp prefix alone determines.
    #[test]
    fn ids_from_increasing_clocks_sort_in_mint_order() {
        let earlier = next_push_id(1_700_000_000_000);
        let later = next_push_id(1_700_000_000_001);
        assert_eq!(earlier.len(), 20);
        assert_eq!(later.len(), 20);
        assert!(earlier[..8] < later[..8]);
    }

    #[test]
    fn same_millisecond_ids_stay_unique() {
        let first = next_push_id(1_800_000_000_000);
        let second = next_push_id(1_800_000_000_000);
        assert_ne!(first, second);
        assert_eq!(first[..8], second[..8]);
    }
}
