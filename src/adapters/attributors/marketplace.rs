use std::str::FromStr;

use borsh::BorshDeserialize;
use serde::Deserialize;
use serde_json::Value;
use solana_sdk::native_token::LAMPORTS_PER_SOL;

use crate::{
    application::{AppError, ProjectAttributor},
    domain::{ProjectContribution, UNKNOWN_PROJECT},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketplaceEvent {
    Listing,
    Bid,
    Sale,
}

/// How much a matched event contributes to its project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AmountMode {
    /// One per event.
    #[default]
    Count,
    /// The instruction's price in SOL; one when the price is unreadable.
    Volume,
}

impl FromStr for AmountMode {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.to_lowercase().as_str() {
            "count" => Ok(AmountMode::Count),
            "volume" => Ok(AmountMode::Volume),
            _ => Err(AppError::Config(format!("Invalid AMOUNT_MODE: {raw}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventRule {
    pub event: MarketplaceEvent,
    pub discriminator: [u8; 8],
    /// Position of the token mint in the instruction's account list.
    pub mint_account_index: usize,
    /// Offset of the little-endian u64 price (lamports) after the discriminator.
    pub price_offset: Option<usize>,
}

#[derive(BorshDeserialize, Debug)]
struct PriceArg {
    lamports: u64,
}

// Just enough of a jsonParsed transaction to find marketplace instructions.
#[derive(Deserialize)]
struct TransactionView {
    transaction: TransactionBody,
    #[serde(default)]
    meta: Option<MetaView>,
}

#[derive(Deserialize)]
struct TransactionBody {
    message: MessageView,
}

#[derive(Deserialize)]
struct MessageView {
    #[serde(default)]
    instructions: Vec<InstructionView>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstructionView {
    #[serde(default)]
    program_id: Option<String>,
    #[serde(default)]
    accounts: Vec<String>,
    #[serde(default)]
    data: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetaView {
    #[serde(default)]
    inner_instructions: Option<Vec<InnerInstructionsView>>,
    #[serde(default)]
    post_token_balances: Option<Vec<TokenBalanceView>>,
}

#[derive(Deserialize)]
struct InnerInstructionsView {
    #[serde(default)]
    instructions: Vec<InstructionView>,
}

#[derive(Deserialize)]
struct TokenBalanceView {
    mint: String,
}

/// Attributes marketplace listings, bids and sales to the token mint they trade.
///
/// Looks at top-level instructions first, then inner (CPI) instructions, and
/// attributes the transaction to the first one matching a rule.
pub struct MarketplaceAttributor {
    program_id: String,
    rules: Vec<EventRule>,
    amount_mode: AmountMode,
}

impl MarketplaceAttributor {
    // Anchor discriminators: sha256("global:<name>")[..8]
    const SELL_DISCRIMINATOR: [u8; 8] = [51, 230, 133, 164, 1, 127, 131, 173];
    const BUY_V2_DISCRIMINATOR: [u8; 8] = [184, 23, 238, 97, 103, 197, 211, 61];
    const EXECUTE_SALE_V2_DISCRIMINATOR: [u8; 8] = [91, 220, 49, 223, 204, 129, 53, 193];

    pub fn new(program_id: impl Into<String>, rules: Vec<EventRule>, amount_mode: AmountMode) -> Self {
        Self {
            program_id: program_id.into(),
            rules,
            amount_mode,
        }
    }

    /// Rules for the Magic Eden v2 instruction layouts.
    pub fn magic_eden_v2_rules() -> Vec<EventRule> {
        vec![
            // sell(program_as_signer_bump: u8, buyer_price: u64, ..)
            // accounts: [wallet, notary, token_account, token_ata, token_mint, ..]
            EventRule {
                event: MarketplaceEvent::Listing,
                discriminator: Self::SELL_DISCRIMINATOR,
                mint_account_index: 4,
                price_offset: Some(1),
            },
            // buy_v2(buyer_price: u64, ..)
            // accounts: [wallet, notary, token_mint, ..]
            EventRule {
                event: MarketplaceEvent::Bid,
                discriminator: Self::BUY_V2_DISCRIMINATOR,
                mint_account_index: 2,
                price_offset: Some(0),
            },
            // execute_sale_v2(escrow_payment_bump: u8, program_as_signer_bump: u8, buyer_price: u64, ..)
            // accounts: [buyer, seller, notary, token_account, token_mint, ..]
            EventRule {
                event: MarketplaceEvent::Sale,
                discriminator: Self::EXECUTE_SALE_V2_DISCRIMINATOR,
                mint_account_index: 4,
                price_offset: Some(2),
            },
        ]
    }

    fn match_rule(&self, ix: &InstructionView) -> Option<(&EventRule, Vec<u8>)> {
        if ix.program_id.as_deref() != Some(self.program_id.as_str()) {
            return None;
        }
        let data = bs58::decode(ix.data.as_deref()?).into_vec().ok()?;
        if data.len() < 8 {
            return None;
        }
        let rule = self.rules.iter().find(|rule| data[..8] == rule.discriminator)?;
        Some((rule, data))
    }

    fn read_price(data: &[u8], offset: usize) -> Option<u64> {
        let mut cursor = data.get(8 + offset..)?;
        PriceArg::deserialize(&mut cursor).ok().map(|arg| arg.lamports)
    }
}

impl ProjectAttributor for MarketplaceAttributor {
    fn name(&self) -> &str {
        "MarketplaceAttributor"
    }

    fn attribute(&self, transaction: &Value) -> Option<ProjectContribution> {
        let view = TransactionView::deserialize(transaction).ok()?;

        let inner = view
            .meta
            .as_ref()
            .and_then(|meta| meta.inner_instructions.as_ref())
            .into_iter()
            .flatten()
            .flat_map(|group| group.instructions.iter());

        let (ix, rule, data) = view
            .transaction
            .message
            .instructions
            .iter()
            .chain(inner)
            .find_map(|ix| self.match_rule(ix).map(|(rule, data)| (ix, rule, data)))?;

        let project_id = ix
            .accounts
            .get(rule.mint_account_index)
            .cloned()
            .or_else(|| {
                view.meta
                    .as_ref()
                    .and_then(|meta| meta.post_token_balances.as_ref())
                    .and_then(|balances| balances.first())
                    .map(|balance| balance.mint.clone())
            })
            .unwrap_or_else(|| UNKNOWN_PROJECT.to_string());

        let amount = match self.amount_mode {
            AmountMode::Count => 1.0,
            AmountMode::Volume => rule
                .price_offset
                .and_then(|offset| Self::read_price(&data, offset))
                .map(|lamports| lamports as f64 / LAMPORTS_PER_SOL as f64)
                .unwrap_or(1.0),
        };

        tracing::trace!(event = ?rule.event, %project_id, amount, "Matched marketplace instruction");
        Some(ProjectContribution::new(project_id, amount))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MAGIC_EDEN_V2_PROGRAM_ID;
    use serde_json::json;

    const MINT: &str = "MintA11111111111111111111111111111111111111";
    const OTHER_PROGRAM: &str = "11111111111111111111111111111111";

    fn sale_data(price_lamports: u64) -> String {
        let mut data = MarketplaceAttributor::EXECUTE_SALE_V2_DISCRIMINATOR.to_vec();
        data.extend_from_slice(&[254, 253]); // bumps
        data.extend_from_slice(&price_lamports.to_le_bytes());
        data.extend_from_slice(&1u64.to_le_bytes()); // token_size
        bs58::encode(data).into_string()
    }

    fn listing_data(price_lamports: u64) -> String {
        let mut data = MarketplaceAttributor::SELL_DISCRIMINATOR.to_vec();
        data.push(255);
        data.extend_from_slice(&price_lamports.to_le_bytes());
        bs58::encode(data).into_string()
    }

    fn sale_accounts() -> Vec<&'static str> {
        vec!["buyer", "seller", "notary", "tokenAccount", MINT, "metadata"]
    }

    fn transaction(instructions: Value, inner: Value) -> Value {
        json!({
            "slot": 250_000_000u64,
            "blockTime": 1_700_000_000i64,
            "transaction": {
                "signatures": ["sig"],
                "message": {
                    "accountKeys": [],
                    "instructions": instructions,
                },
            },
            "meta": {
                "err": null,
                "innerInstructions": inner,
                "postTokenBalances": [{"accountIndex": 3, "mint": "FallbackMint", "uiTokenAmount": {}}],
            },
        })
    }

    fn attributor(mode: AmountMode) -> MarketplaceAttributor {
        MarketplaceAttributor::new(
            MAGIC_EDEN_V2_PROGRAM_ID,
            MarketplaceAttributor::magic_eden_v2_rules(),
            mode,
        )
    }

    #[test]
    fn counts_a_sale_against_its_mint() {
        let tx = transaction(
            json!([
                {"programId": "ComputeBudget111111111111111111111111111111", "accounts": [], "data": "3gJqkocMWaMm"},
                {"programId": MAGIC_EDEN_V2_PROGRAM_ID, "accounts": sale_accounts(), "data": sale_data(2_500_000_000)},
            ]),
            json!([]),
        );

        let contribution = attributor(AmountMode::Count).attribute(&tx).unwrap();
        assert_eq!(contribution, ProjectContribution::new(MINT, 1.0));
    }

    #[test]
    fn volume_mode_reads_the_price_in_sol() {
        let tx = transaction(
            json!([{"programId": MAGIC_EDEN_V2_PROGRAM_ID, "accounts": sale_accounts(), "data": sale_data(2_500_000_000)}]),
            json!([]),
        );

        let contribution = attributor(AmountMode::Volume).attribute(&tx).unwrap();
        assert_eq!(contribution.project_id, MINT);
        assert!((contribution.amount - 2.5).abs() < 1e-9);
    }

    #[test]
    fn finds_marketplace_calls_in_inner_instructions() {
        let listing_accounts = vec!["wallet", "notary", "tokenAccount", "tokenAta", MINT];
        let tx = transaction(
            json!([{"programId": "Aggregator1111111111111111111111111111111111", "accounts": [], "data": "1"}]),
            json!([{
                "index": 0,
                "instructions": [
                    {"program": "spl-token", "programId": "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA", "parsed": {"type": "transfer"}},
                    {"programId": MAGIC_EDEN_V2_PROGRAM_ID, "accounts": listing_accounts, "data": listing_data(1_000_000_000)},
                ],
            }]),
        );

        let contribution = attributor(AmountMode::Volume).attribute(&tx).unwrap();
        assert_eq!(contribution, ProjectContribution::new(MINT, 1.0));
    }

    #[test]
    fn falls_back_to_token_balance_mint_when_accounts_are_short() {
        let tx = transaction(
            json!([{"programId": MAGIC_EDEN_V2_PROGRAM_ID, "accounts": ["buyer"], "data": sale_data(10)}]),
            json!([]),
        );

        let contribution = attributor(AmountMode::Count).attribute(&tx).unwrap();
        assert_eq!(contribution.project_id, "FallbackMint");
    }

    #[test]
    fn unreadable_price_counts_as_one() {
        let mut data = MarketplaceAttributor::EXECUTE_SALE_V2_DISCRIMINATOR.to_vec();
        data.extend_from_slice(&[1, 2, 3]);
        let tx = transaction(
            json!([{"programId": MAGIC_EDEN_V2_PROGRAM_ID, "accounts": sale_accounts(), "data": bs58::encode(data).into_string()}]),
            json!([]),
        );

        let contribution = attributor(AmountMode::Volume).attribute(&tx).unwrap();
        assert_eq!(contribution.amount, 1.0);
    }

    #[test]
    fn ignores_other_programs_and_unknown_instructions() {
        let unknown = bs58::encode([9u8; 16]).into_string();
        let tx = transaction(
            json!([
                {"programId": OTHER_PROGRAM, "accounts": sale_accounts(), "data": sale_data(5)},
                {"programId": MAGIC_EDEN_V2_PROGRAM_ID, "accounts": sale_accounts(), "data": unknown},
                {"programId": MAGIC_EDEN_V2_PROGRAM_ID, "accounts": [], "data": "not*base58"},
            ]),
            Value::Null,
        );

        assert!(attributor(AmountMode::Count).attribute(&tx).is_none());
    }

    #[test]
    fn ignores_transactions_without_a_parsed_message() {
        let tx = json!({"slot": 1, "transaction": ["AQID", "base64"], "meta": null});
        assert!(attributor(AmountMode::Count).attribute(&tx).is_none());
    }

    #[test]
    fn parses_amount_mode() {
        assert_eq!("count".parse::<AmountMode>().unwrap(), AmountMode::Count);
        assert_eq!("Volume".parse::<AmountMode>().unwrap(), AmountMode::Volume);
        assert!("sum".parse::<AmountMode>().is_err());
    }
}
