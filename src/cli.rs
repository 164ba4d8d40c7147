use clap::ValueEnum;

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProgressMode {
    /// One progress bar per slice
    Bars,
    /// Log slice events instead of drawing bars
    Log,
    /// Stay silent
    None,
}

/// Parse a `Name: Value` header argument.
pub fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected \"Name: Value\", got {:?}", raw))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing header name in {:?}", raw));
    }
    Ok((name.to_string(), value.trim().to_string()))
}
