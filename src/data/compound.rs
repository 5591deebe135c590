//! Tokenizer for compound formulas written as `symbol:weight_percent` pairs.

/// One `symbol:weight_percent` term of a compound.
#[derive(Clone, Debug, PartialEq)]
pub struct CompoundPart {
    pub symbol: String,
    pub weight_percent: f64,
}

/// Result of tokenizing a compound string.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParsedCompound {
    /// Terms that parsed cleanly.
    pub parts: Vec<CompoundPart>,
    /// Raw tokens that were rejected.
    pub skipped: Vec<String>,
}

/// Split `"N:78.08,O:20.95,Ar:0.93"` into its terms.
///
/// Tokens without a `:`, with an empty symbol, or with a weight that is not a
/// positive number end up in `skipped` instead of `parts`.
pub fn parse_compound(compound: &str) -> ParsedCompound {
    let mut parsed = ParsedCompound::default();

    for token in compound.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }

        let Some((symbol, amount)) = token.split_once(':') else {
            parsed.skipped.push(token.to_string());
            continue;
        };

        let symbol = symbol.trim();
        match amount.trim().parse::<f64>() {
            Ok(weight_percent) if !symbol.is_empty() && weight_percent > 0.0 => {
                parsed.parts.push(CompoundPart {
                    symbol: symbol.to_string(),
                    weight_percent,
                });
            }
            _ => parsed.skipped.push(token.to_string()),
        }
    }

    parsed
}
