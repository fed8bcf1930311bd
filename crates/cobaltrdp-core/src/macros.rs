//! Helper macros shared by the codec crates.

/// Expands to the name of the enclosing function.
#[macro_export]
macro_rules! function {
    () => {{
        fn f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            core::any::type_name::<T>()
        }
        let name = type_name_of(f);
        name.strip_suffix("::f").unwrap_or(name)
    }};
}

/// Returns early with a "not enough bytes" error when the buffer is too small.
#[macro_export]
macro_rules! ensure_size {
    (ctx: $ctx:expr, in: $buf:ident, size: $expected:expr) => {{
        let received = $buf.len();
        let expected = $expected;
        if !(received >= expected) {
            return Err($crate::not_enough_bytes_err($ctx, received, expected));
        }
    }};
    (in: $buf:ident, size: $expected:expr) => {{
        $crate::ensure_size!(ctx: Self::NAME, in: $buf, size: $expected)
    }};
}

/// Like [`ensure_size!`] for the fixed part of a structure.
#[macro_export]
macro_rules! ensure_fixed_part_size {
    (in: $buf:ident) => {{
        $crate::ensure_size!(ctx: Self::NAME, in: $buf, size: Self::FIXED_PART_SIZE)
    }};
}

/// Fallible numeric cast attributing failures to a named field.
#[macro_export]
macro_rules! cast_length {
    ($ctx:expr, $field:expr, $len:expr) => {{
        $len.try_into()
            .map_err(|_| $crate::invalid_field_err($ctx, $field, "too many elements"))
    }};
    ($field:expr, $len:expr) => {{
        $crate::cast_length!(Self::NAME, $field, $len)
    }};
}

/// Creates an "invalid field" error with the enclosing type as context.
#[macro_export]
macro_rules! invalid_field_err {
    ($field:expr, $reason:expr $(,)?) => {{
        $crate::invalid_field_err(Self::NAME, $field, $reason)
    }};
}

/// Creates an "unexpected message type" error with the given context.
#[macro_export]
macro_rules! unexpected_message_type_err {
    ($ctx:expr, $got:expr $(,)?) => {{
        $crate::unexpected_message_type_err($ctx, $got)
    }};
}

/// Creates an "unsupported version" error with the given context.
#[macro_export]
macro_rules! unsupported_version_err {
    ($ctx:expr, $got:expr $(,)?) => {{
        $crate::unsupported_version_err($ctx, $got)
    }};
}

/// Creates an "other" error, optionally with a source attached.
#[macro_export]
macro_rules! other_err {
    ($ctx:expr, source: $source:expr $(,)?) => {{
        $crate::other_err_with_source($ctx, "", $source)
    }};
    ($ctx:expr, $description:expr $(,)?) => {{
        $crate::other_err($ctx, $description)
    }};
    ($description:expr $(,)?) => {{
        $crate::other_err($crate::function!(), $description)
    }};
}

/// Asserts that the traits support dynamic dispatch.
#[macro_export]
macro_rules! assert_obj_safe {
    ($($xs:path),+ $(,)?) => {
        $(const _: Option<&dyn $xs> = None;)+
    };
}

/// Asserts that the type implements _all_ of the given traits.
#[macro_export]
macro_rules! assert_impl {
    ($type:ty: $($trait:path),+ $(,)?) => {
        const _: fn() = || {
            fn assert_impl_all<T: ?Sized $(+ $trait)+>() {}
            assert_impl_all::<$type>();
        };
    };
}
