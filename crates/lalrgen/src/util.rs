use std::fmt;

pub fn display_fn<F>(f: F) -> impl fmt::Display
where
    F: Fn(&mut fmt::Formatter<'_>) -> fmt::Result,
{
    struct DisplayFn<F> {
        f: F,
    }
    impl<F> fmt::Display for DisplayFn<F>
    where
        F: Fn(&mut fmt::Formatter<'_>) -> fmt::Result,
    {
        fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            (self.f)(formatter)
        }
    }
    DisplayFn { f }
}

/// Render a character literal the way it is written in grammar files.
pub fn escape_char(ch: char) -> String {
    match ch {
        '\n' => "'\\n'".into(),
        '\t' => "'\\t'".into(),
        '\r' => "'\\r'".into(),
        '\0' => "'\\0'".into(),
        '\\' => "'\\\\'".into(),
        '\'' => "'\\''".into(),
        ch => format!("'{}'", ch),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escaped_literals() {
        assert_eq!(escape_char('+'), "'+'");
        assert_eq!(escape_char('\n'), "'\\n'");
        assert_eq!(escape_char('\''), "'\\''");
        assert_eq!(format!("{}", display_fn(|f| f.write_str("x"))), "x");
    }
}
