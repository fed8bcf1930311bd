/// Reads and discards padding bytes.
#[macro_export]
macro_rules! read_padding {
    ($src:ident, $n:expr) => {{
        $src.advance($n);
    }};
}

/// Writes zeroed padding bytes.
#[macro_export]
macro_rules! write_padding {
    ($dst:ident, $n:expr) => {{
        for _ in 0..$n {
            $dst.write_u8(0);
        }
    }};
}
