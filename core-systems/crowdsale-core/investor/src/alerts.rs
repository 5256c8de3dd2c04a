//! Alert presenter for a terminal session: every alert becomes a log event.

use crowdsale_launchpad::chain::{Alert, AlertPresenter};
use crowdsale_launchpad::gas::format_gwei;
use tracing::{error, info, warn};

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAlerts;

/// One-line operator message for `alert`.
pub fn describe(alert: &Alert) -> String {
    match alert {
        Alert::Failed(reason) => format!("investment failed: {reason}"),
        Alert::Succeeded { tokens } => format!("purchased {tokens} tokens"),
        Alert::NoGasPriceAvailable => "no gas price available, set gas_price.custom_gwei".to_string(),
        Alert::InvalidCrowdsaleAddress(addr) => format!("crowdsale address `{addr}` is not valid"),
        Alert::MainnetDeployment { tiers, whitelisted, reserved, gas_price } => format!(
            "deploying to Ethereum MAINNET: {tiers} tier(s), {whitelisted} whitelisted address(es), \
             {reserved} reserved token holder(s), gas price {} gwei",
            format_gwei(*gas_price)
        ),
    }
}

impl AlertPresenter for TracingAlerts {
    fn notify(&self, alert: &Alert) {
        let message = describe(alert);
        match alert {
            Alert::Succeeded { .. } => info!(target: "crowdsale::alert", "{message}"),
            Alert::MainnetDeployment { .. } | Alert::NoGasPriceAvailable => {
                warn!(target: "crowdsale::alert", "{message}")
            }
            Alert::Failed(_) | Alert::InvalidCrowdsaleAddress(_) => error!(target: "crowdsale::alert", "{message}"),
        }
    }
}
