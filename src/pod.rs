/// Marker trait for sample types that channels may move between threads as
/// raw bytes: `Copy` with no borrowed data, and safe to send across the
/// thread boundary a [`crate::channel::Producer`]/[`crate::channel::Consumer`]
/// split always crosses.
///
/// This is conduit's compile-time rendition of the original source's
/// runtime "trivially copyable" requirement on channel element types; any
/// `Copy + Send + 'static` type satisfies it automatically. The `Send`
/// bound is load-bearing: without it, a `Copy` type with no borrowed data
/// but interior `!Send` state (a raw pointer, `PhantomData<Rc<()>>`) could
/// still pass, and the channel's `unsafe impl Send` would be asserting
/// something the compiler never checked.
pub trait Pod: Copy + Send + 'static {}

impl<T: Copy + Send + 'static> Pod for T {}
