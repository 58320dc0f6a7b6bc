use super::types::Action;

/// Human summary shown next to a transaction before signing
pub fn generate_description(action: &Action<'_>) -> String {
    match action {
        Action::Withdraw {
            protocol_name,
            display_amount,
            input_symbol,
            output_symbol,
        } => format!("Withdraw {display_amount} {output_symbol} to {input_symbol} on {protocol_name}"),
        Action::Deposit {
            protocol_name,
            display_amount,
            input_symbol,
        } => {
            let amount = display_amount.map(|a| format!("{a} ")).unwrap_or_default();
            format!("Deposit {amount}{input_symbol} to {protocol_name}")
        }
        Action::Approve {
            spender_name,
            display_amount,
            token_symbol,
        } => {
            let spender = spender_name.map(|s| format!("{s} ")).unwrap_or_default();
            format!("Approve {spender}to spend {display_amount} {token_symbol}")
        }
        Action::Permit {
            kind,
            spender_name,
            display_amount,
            token_symbol,
        } => {
            let spender = spender_name.map(|s| format!("{s} ")).unwrap_or_default();
            format!("Approve {spender}to spend {display_amount} {token_symbol} (via {kind})")
        }
        Action::Repay {
            protocol_name,
            display_amount,
            token_symbol,
        } => format!("Repay {display_amount} {token_symbol} on {protocol_name}"),
    }
}

/// Compound a simple annual rate `n` times per year
pub fn apr_to_apy(apr: f64, n: u32) -> f64 {
    let n = f64::from(n.max(1));
    (1.0 + apr / n).powf(n) - 1.0
}
