use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SelectConfig {
    /// Whether `Select::new` listens to the process signal registry
    #[serde(default = "default_interrupt_on_signal")]
    pub interrupt_on_signal: bool,
}

impl Default for SelectConfig {
    fn default() -> Self {
        Self {
            interrupt_on_signal: default_interrupt_on_signal(),
        }
    }
}

fn default_interrupt_on_signal() -> bool {
    true
}
