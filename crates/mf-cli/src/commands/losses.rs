use anyhow::Result;
use clap::Args;
use mf_loss::LossKind;

/// Print the registered loss names, one per line
#[derive(Args, Debug, Clone, Default)]
pub struct LossesCommand {}

impl LossesCommand {
    /// Names in registration order.
    pub fn names(&self) -> Vec<&'static str> {
        LossKind::ALL.iter().map(|kind| kind.name()).collect()
    }

    pub fn run(&self) -> Result<()> {
        for name in self.names() {
            println!("{name}");
        }
        Ok(())
    }
}
