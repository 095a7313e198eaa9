#[cfg(test)]
mod branch_tests;
#[cfg(test)]
mod frequency_tests;
#[cfg(test)]
mod iocoom_tests;
#[cfg(test)]
mod model_tests;

#[cfg(test)]
pub(crate) mod helpers {
    use std::sync::Arc;

    use crate::config::SimConfig;
    use crate::perf::model::{CoreKind, CorePerfModel};

    pub fn config_with_model(model: &str) -> SimConfig {
        let mut config = SimConfig::for_testing(4, 1);
        config.perf.core_model = model.to_string();
        config
    }

    /// An enabled main-core model on an application tile.
    pub fn enabled_model(model: &str) -> Arc<CorePerfModel> {
        let config = config_with_model(model);
        let model = CorePerfModel::create(1, CoreKind::Main, &config).expect("main model");
        model.enable();
        model
    }
}
