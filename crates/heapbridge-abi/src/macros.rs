//! Export macro for the C ABI surface.

/// Export a router operation under a C symbol.
///
/// ```ignore
/// abi_export! {
///     /// Doc comment for the symbol.
///     fn heapbridge_alloc(size: usize, align: usize) -> *mut u8 => alloc
/// }
/// ```
///
/// expands to a `#[unsafe(no_mangle)] pub unsafe extern "C" fn` that passes
/// its arguments, in order, to the method of the same arity on
/// `heapbridge_core::ROUTER`.
macro_rules! abi_export {
    (
        $(#[$meta:meta])*
        fn $name:ident( $($arg:ident : $argty:ty),* $(,)? ) $(-> $ret:ty)? => $method:ident
    ) => {
        $(#[$meta])*
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn $name( $($arg : $argty),* ) $(-> $ret)? {
            // SAFETY: the caller upholds the contract of the forwarded router method.
            unsafe { ::heapbridge_core::ROUTER.$method($($arg),*) }
        }
    };
}
