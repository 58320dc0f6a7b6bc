//! Registry of protocol adapters keyed by id

use alloy_primitives::{Address, U256};
use futures::future::{join_all, try_join_all};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::protocols::{Aave, Ethena, EtherFi, Lido, Morpho, RocketPool};
use super::types::{PositionPair, TxInfo, VaultMetadata, Withdraw};
use super::{DefiProtocol, ProtocolContext, ProtocolSettings};
use crate::chain::Chain;
use crate::error::{OptimizerError, Result};
use crate::tokens::Token;

/// Immutable after construction; share it behind an `Arc`
pub struct ProtocolManager {
    protocols: BTreeMap<String, Arc<dyn DefiProtocol>>,
}

impl ProtocolManager {
    /// Later adapters replace earlier ones with the same id
    pub fn new(protocols: Vec<Arc<dyn DefiProtocol>>) -> Self {
        let protocols = protocols
            .into_iter()
            .map(|p| (p.id().to_string(), p))
            .collect();
        Self { protocols }
    }

    /// Every adapter the crate ships: lending markets first, then staking
    pub fn with_default_protocols(ctx: ProtocolContext, settings: &ProtocolSettings) -> Self {
        let protocols: Vec<Arc<dyn DefiProtocol>> = vec![
            Arc::new(Aave::new(ctx.clone())),
            Arc::new(Aave::spark(ctx.clone())),
            Arc::new(Morpho::new(ctx.clone(), settings.morpho_api_url.clone())),
            Arc::new(Lido::new(ctx.clone(), settings.lido_api_url.clone(), settings.referral_account)),
            Arc::new(RocketPool::new(ctx.clone(), settings.rocketpool_api_url.clone())),
            Arc::new(Ethena::new(ctx.clone(), settings.ethena_api_url.clone())),
            Arc::new(EtherFi::new(ctx, settings.etherfi_api_url.clone())),
        ];
        let manager = Self::new(protocols);
        info!("Registered protocols: {}", manager.protocol_ids().join(", "));
        manager
    }

    pub fn protocol(&self, id: &str) -> Option<&Arc<dyn DefiProtocol>> {
        self.protocols.get(id)
    }

    pub fn protocol_ids(&self) -> Vec<&str> {
        self.protocols.keys().map(String::as_str).collect()
    }

    fn require(&self, id: &str) -> Result<&Arc<dyn DefiProtocol>> {
        self.protocol(id)
            .ok_or_else(|| OptimizerError::ProtocolNotFound(id.to_string()))
    }

    /// Best effort: an unknown id or a failing adapter contributes nothing
    pub async fn positions_metadata(&self, chain: &Chain, pairs: &[PositionPair]) -> Vec<VaultMetadata> {
        let lookups = pairs.iter().map(|pair| async move {
            let Some(protocol) = self.protocol(&pair.protocol_id) else {
                warn!("Skipping position for unknown protocol '{}'", pair.protocol_id);
                return None;
            };
            match protocol
                .position_info(chain, pair.input_token_address, pair.output_token_address)
                .await
            {
                Ok(metadata) => Some(metadata),
                Err(e) => {
                    warn!(
                        "Position {} {:?} -> {:?} unavailable: {}",
                        pair.protocol_id, pair.input_token_address, pair.output_token_address, e
                    );
                    None
                }
            }
        });

        join_all(lookups).await.into_iter().flatten().collect()
    }

    /// All vaults accepting `input_token`, across every adapter.
    ///
    /// Unlike `positions_metadata`, the first adapter error fails the call.
    pub async fn vaults_metadata(&self, chain: &Chain, input_token: Address) -> Result<Vec<VaultMetadata>> {
        let lookups = self
            .protocols
            .values()
            .map(|protocol| protocol.vaults_info(chain, input_token));

        let vaults: Vec<VaultMetadata> = try_join_all(lookups).await?.into_iter().flatten().collect();
        debug!("{} vaults accept {:?} on {}", vaults.len(), input_token, chain.name);
        Ok(vaults)
    }

    pub async fn withdraw(
        &self,
        protocol_id: &str,
        chain: &Chain,
        user: Address,
        input_token: &Token,
        output_token: &Token,
        amount: U256,
    ) -> Result<Withdraw> {
        let protocol = self.require(protocol_id)?;
        let txs = protocol
            .withdraw(chain, user, input_token, output_token, amount)
            .await?;
        let amount = protocol
            .withdrawal_amount(chain, input_token, output_token, amount)
            .await?;
        info!(
            "Built {} withdrawal of {} {}",
            protocol.name(),
            input_token.display_amount(amount),
            input_token.symbol
        );
        Ok(Withdraw { txs, amount })
    }

    pub async fn deposit(
        &self,
        protocol_id: &str,
        chain: &Chain,
        user: Address,
        input_token: &Token,
        output_token: &Token,
        amount: U256,
    ) -> Result<Vec<TxInfo>> {
        let protocol = self.require(protocol_id)?;
        let txs = protocol
            .deposit(chain, user, input_token, output_token, amount)
            .await?;
        info!("Built {} {} deposit transaction(s)", txs.len(), protocol.name());
        Ok(txs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MAINNET;
    use crate::optimizer::types::{Category, WithdrawTxs};
    use crate::tokens::{NATIVE_TOKEN_ADDRESS, USDC};
    use alloy_primitives::{address, Bytes};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const OUTPUT: Address = address!("3333333333333333333333333333333333333333");

    /// Adapter with scripted answers
    struct FakeProtocol {
        id: &'static str,
        fail: bool,
        vaults: usize,
        withdraw_calls: AtomicUsize,
    }

    impl FakeProtocol {
        fn new(id: &'static str, vaults: usize) -> Self {
            Self {
                id,
                fail: false,
                vaults,
                withdraw_calls: AtomicUsize::new(0),
            }
        }

        fn failing(id: &'static str) -> Self {
            Self {
                fail: true,
                ..Self::new(id, 0)
            }
        }

        fn metadata(&self, input: Address, output: Address) -> VaultMetadata {
            VaultMetadata {
                protocol: self.descriptor(),
                name: Some(self.id.to_string()),
                category: Category::Other,
                site_url: String::new(),
                input_token: token(input, "IN"),
                output_token: token(output, "OUT"),
                tvl: 1.0,
                apy: 0.01,
                rewards: vec![],
            }
        }

        fn check(&self) -> Result<()> {
            if self.fail {
                return Err(OptimizerError::Chain("node unavailable".into()));
            }
            Ok(())
        }
    }

    fn token(address: Address, symbol: &str) -> Token {
        Token {
            name: symbol.to_string(),
            symbol: symbol.to_string(),
            decimals: 6,
            address,
            logo_url: None,
        }
    }

    #[async_trait]
    impl DefiProtocol for FakeProtocol {
        fn id(&self) -> &str {
            self.id
        }
        fn name(&self) -> &str {
            self.id
        }
        fn site_url(&self) -> &str {
            "https://example.org"
        }
        fn category(&self) -> Category {
            Category::Other
        }
        fn is_withdrawal_supported(&self) -> bool {
            true
        }

        async fn position_info(&self, _chain: &Chain, input: Address, output: Address) -> Result<VaultMetadata> {
            self.check()?;
            Ok(self.metadata(input, output))
        }

        async fn vaults_info(&self, _chain: &Chain, input: Address) -> Result<Vec<VaultMetadata>> {
            self.check()?;
            Ok((0..self.vaults).map(|_| self.metadata(input, OUTPUT)).collect())
        }

        async fn withdrawal_amount(&self, _chain: &Chain, _input: &Token, _output: &Token, amount: U256) -> Result<U256> {
            Ok(amount / U256::from(2u8))
        }

        async fn withdraw(
            &self,
            _chain: &Chain,
            _user: Address,
            _input: &Token,
            _output: &Token,
            _amount: U256,
        ) -> Result<WithdrawTxs> {
            self.withdraw_calls.fetch_add(1, Ordering::SeqCst);
            Ok(WithdrawTxs::Txs(vec![]))
        }

        async fn deposit(
            &self,
            _chain: &Chain,
            _user: Address,
            input: &Token,
            _output: &Token,
            _amount: U256,
        ) -> Result<Vec<TxInfo>> {
            Ok(vec![TxInfo {
                to: input.address,
                value: U256::ZERO,
                data: Bytes::new(),
                description: format!("Deposit to {}", self.id),
                display_amount: String::new(),
                function: None,
            }])
        }
    }

    fn registry(protocols: Vec<FakeProtocol>) -> ProtocolManager {
        ProtocolManager::new(
            protocols
                .into_iter()
                .map(|p| Arc::new(p) as Arc<dyn DefiProtocol>)
                .collect(),
        )
    }

    fn pair(id: &str) -> PositionPair {
        PositionPair {
            protocol_id: id.to_string(),
            input_token_address: USDC,
            output_token_address: OUTPUT,
        }
    }

    #[tokio::test]
    async fn test_withdraw_unknown_protocol() {
        let manager = registry(vec![FakeProtocol::new("alpha", 1)]);
        let usdc = token(USDC, "USDC");
        let out = token(OUTPUT, "OUT");

        let err = manager
            .withdraw("nonexistent-protocol-id", &MAINNET, OUTPUT, &usdc, &out, U256::from(1u8))
            .await
            .unwrap_err();
        assert!(matches!(err, OptimizerError::ProtocolNotFound(_)));
        assert_eq!(err.to_string(), "Protocol with id 'nonexistent-protocol-id' not found");

        let err = manager
            .deposit("nonexistent-protocol-id", &MAINNET, OUTPUT, &usdc, &out, U256::from(1u8))
            .await
            .unwrap_err();
        assert!(matches!(err, OptimizerError::ProtocolNotFound(_)));
    }

    #[tokio::test]
    async fn test_withdraw_reports_amount() {
        let alpha = Arc::new(FakeProtocol::new("alpha", 1));
        let manager = ProtocolManager::new(vec![alpha.clone() as Arc<dyn DefiProtocol>]);

        let withdraw = manager
            .withdraw("alpha", &MAINNET, OUTPUT, &token(USDC, "USDC"), &token(OUTPUT, "OUT"), U256::from(10u8))
            .await
            .unwrap();
        assert_eq!(withdraw.amount, U256::from(5u8));
        assert_eq!(alpha.withdraw_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_deposit_delegates() {
        let manager = registry(vec![FakeProtocol::new("alpha", 1), FakeProtocol::new("beta", 1)]);
        let txs = manager
            .deposit("beta", &MAINNET, OUTPUT, &token(USDC, "USDC"), &token(OUTPUT, "OUT"), U256::from(10u8))
            .await
            .unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].description, "Deposit to beta");
    }

    #[tokio::test]
    async fn test_vaults_metadata_empty_is_not_an_error() {
        let manager = registry(vec![FakeProtocol::new("alpha", 0), FakeProtocol::new("beta", 0)]);
        let vaults = manager.vaults_metadata(&MAINNET, NATIVE_TOKEN_ADDRESS).await.unwrap();
        assert!(vaults.is_empty());
    }

    #[tokio::test]
    async fn test_vaults_metadata_flattens_and_propagates_errors() {
        let manager = registry(vec![FakeProtocol::new("alpha", 2), FakeProtocol::new("beta", 1)]);
        assert_eq!(manager.vaults_metadata(&MAINNET, USDC).await.unwrap().len(), 3);

        let manager = registry(vec![FakeProtocol::new("alpha", 2), FakeProtocol::failing("broken")]);
        assert!(manager.vaults_metadata(&MAINNET, USDC).await.is_err());
    }

    #[tokio::test]
    async fn test_positions_metadata_degrades_per_pair() {
        let manager = registry(vec![FakeProtocol::new("alpha", 1), FakeProtocol::failing("broken")]);

        let pairs = [pair("alpha"), pair("broken"), pair("missing"), pair("alpha")];
        let positions = manager.positions_metadata(&MAINNET, &pairs).await;

        assert_eq!(positions.len(), 2);
        assert!(positions.iter().all(|p| p.protocol.id == "alpha"));
    }

    /// Shared sink for a test-local fmt subscriber
    #[derive(Clone, Default)]
    struct LogSink(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for LogSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_positions_metadata_warns_on_skipped_pairs() {
        let sink = LogSink::default();
        let writer = sink.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let manager = registry(vec![FakeProtocol::failing("broken")]);
        let positions = manager
            .positions_metadata(&MAINNET, &[pair("missing"), pair("broken")])
            .await;
        assert!(positions.is_empty());

        let logs = String::from_utf8(sink.0.lock().unwrap().clone()).unwrap();
        let warnings: Vec<&str> = logs.lines().filter(|l| l.contains("WARN")).collect();
        assert_eq!(warnings.len(), 2, "{logs}");
        assert!(warnings.iter().any(|l| l.contains("unknown protocol 'missing'")));
        assert!(logs.contains("node unavailable"));
    }

    #[test]
    fn test_registry_lookup() {
        let manager = registry(vec![FakeProtocol::new("beta", 0), FakeProtocol::new("alpha", 0)]);
        assert_eq!(manager.protocol_ids(), vec!["alpha", "beta"]);
        assert!(manager.protocol("alpha").is_some());
        assert!(manager.protocol("gamma").is_none());
    }

    #[test]
    fn test_default_protocols() {
        use crate::testing::{MockChainReader, MockJsonClient};
        use crate::tokens::TokenService;

        let reader = Arc::new(MockChainReader::new());
        let tokens = Arc::new(TokenService::with_defaults(reader.clone()));
        let ctx = ProtocolContext::new(reader, Arc::new(MockJsonClient::new()), tokens);
        let manager = ProtocolManager::with_default_protocols(ctx, &ProtocolSettings::default());

        assert_eq!(
            manager.protocol_ids(),
            vec!["aave3", "etherfi", "ethena", "lido", "morphoblue", "rocketpool", "spark"]
        );
        let withdrawable: Vec<_> = manager
            .protocol_ids()
            .into_iter()
            .filter(|id| manager.protocol(id).unwrap().is_withdrawal_supported())
            .collect();
        assert_eq!(withdrawable, vec!["aave3", "morphoblue", "rocketpool", "spark"]);
        assert_eq!(manager.protocol("spark").unwrap().name(), "Spark");
    }
}
