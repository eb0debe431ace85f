use std::any::type_name;
use std::sync::OnceLock;

/// Returns a short, de-mangled default name for `T`, suitable as a
/// [`crate::block::Block::name`] fallback.
///
/// Strips module-path qualifiers and generic parameter lists from
/// `std::any::type_name`, caching the result per monomorphization the same
/// way the teacher interns its own short type names.
pub fn short_type_name<T: 'static>() -> &'static str {
    static CACHE: OnceLock<std::sync::Mutex<Vec<(std::any::TypeId, &'static str)>>> =
        OnceLock::new();
    let cache = CACHE.get_or_init(Default::default);
    let id = std::any::TypeId::of::<T>();
    let mut guard = cache.lock().unwrap();
    if let Some((_, name)) = guard.iter().find(|(cached_id, _)| *cached_id == id) {
        return name;
    }
    let short = shorten(type_name::<T>());
    let leaked: &'static str = Box::leak(short.into_boxed_str());
    guard.push((id, leaked));
    leaked
}

fn shorten(full: &str) -> String {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}

/// Rounds `n` down to the nearest power of two, or `0` if `n == 0`.
///
/// An optional transfer-size optimization some blocks apply before a
/// `writeN`/`readN` call; never invoked by the channel or runner
/// themselves.
pub fn floor_pow2(n: usize) -> usize {
    if n == 0 {
        0
    } else {
        1usize << (usize::BITS - 1 - n.leading_zeros())
    }
}
