//! Table-driven type vocabulary.
//!
//! Every dialect owns one [`TypeMap`]: a list of native spellings that
//! normalize to a canonical type, and a list describing how each canonical
//! type is written back in DDL. Supporting a new engine means writing two
//! tables, not touching the generator.

/// How a canonical type is spelled in a target dialect.
#[derive(Debug, Clone, Copy)]
pub struct NativeType {
    /// Canonical base type (`varchar`, `decimal`, ...).
    pub canonical: &'static str,
    /// Native base spelling.
    pub native: &'static str,
    /// Whether length/precision arguments carry over.
    pub keeps_args: bool,
    /// Arguments to use when the canonical type has none.
    pub default_args: Option<&'static str>,
}

impl NativeType {
    /// A type that takes no arguments.
    pub const fn plain(canonical: &'static str, native: &'static str) -> Self {
        Self {
            canonical,
            native,
            keeps_args: false,
            default_args: None,
        }
    }

    /// A type that keeps its arguments.
    pub const fn sized(canonical: &'static str, native: &'static str) -> Self {
        Self {
            canonical,
            native,
            keeps_args: true,
            default_args: None,
        }
    }

    /// A type that keeps its arguments and needs some when absent.
    pub const fn sized_or(
        canonical: &'static str,
        native: &'static str,
        default_args: &'static str,
    ) -> Self {
        Self {
            canonical,
            native,
            keeps_args: true,
            default_args: Some(default_args),
        }
    }
}

/// Bidirectional type table for one dialect.
#[derive(Debug)]
pub struct TypeMap {
    /// Full native spellings (with arguments) matched before base lookup.
    pub exact: &'static [(&'static str, &'static str)],
    /// Native base type → canonical base type.
    pub normalize: &'static [(&'static str, &'static str)],
    /// Canonical types whose arguments are significant for diffing.
    pub parameterized: &'static [&'static str],
    /// Canonical base type → native spelling.
    pub native: &'static [NativeType],
    /// Native type for canonical types the table does not know.
    pub fallback: &'static str,
}

impl TypeMap {
    /// Normalize a native type string into the shared vocabulary.
    pub fn normalize(&self, native: &str) -> String {
        let cleaned = clean(native);
        if let Some((_, canonical)) = self.exact.iter().find(|(n, _)| *n == cleaned) {
            return (*canonical).to_string();
        }

        let (base, args) = split_type(&cleaned);
        let canonical = self
            .normalize
            .iter()
            .find(|(n, _)| *n == base)
            .map(|(_, c)| (*c).to_string())
            .unwrap_or(base);

        match args {
            Some(args) if self.parameterized.contains(&canonical.as_str()) => {
                format!("{canonical}({args})")
            }
            _ => canonical,
        }
    }

    /// Spell a canonical type in this dialect.
    pub fn to_native(&self, canonical: &str) -> String {
        let (base, args) = split_type(&clean(canonical));
        match self.native.iter().find(|t| t.canonical == base) {
            Some(t) => {
                let args = if t.keeps_args {
                    args.or_else(|| t.default_args.map(str::to_string))
                } else {
                    None
                };
                match args {
                    Some(args) => format!("{}({})", t.native, args),
                    None => t.native.to_string(),
                }
            }
            None => self.fallback.to_string(),
        }
    }
}

/// Lowercase, drop MySQL display modifiers and collapse whitespace.
fn clean(native: &str) -> String {
    native
        .to_ascii_lowercase()
        .replace(" unsigned", "")
        .replace(" zerofill", "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split `timestamp(6) with time zone` into (`timestamp with time zone`, `6`).
pub fn split_type(ty: &str) -> (String, Option<String>) {
    match (ty.find('('), ty.rfind(')')) {
        (Some(open), Some(close)) if close > open => {
            let args: String = ty[open + 1..close]
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect();
            let base = format!("{} {}", ty[..open].trim(), ty[close + 1..].trim());
            let base = base.split_whitespace().collect::<Vec<_>>().join(" ");
            let args = if args.is_empty() { None } else { Some(args) };
            (base, args)
        }
        _ => (ty.trim().to_string(), None),
    }
}
