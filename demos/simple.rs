use std::{sync::Arc, time::SystemTime};

use wiring::*;

// Define regular traits and implementor structs

trait Logger: Send + Sync {
    fn log(&self, content: &str);
}

trait DateLogger: Send + Sync {
    fn log_date(&self);
}

struct StdoutLogger {
    prefix: Arc<String>,
}

impl Logger for StdoutLogger {
    fn log(&self, content: &str) {
        println!("[{}] {}", self.prefix, content);
    }
}

struct DateLoggerImpl {
    logger: Arc<dyn Logger>,
}

impl DateLoggerImpl {
    fn new(logger: Arc<dyn Logger>) -> Self {
        Self { logger }
    }
}

impl DateLogger for DateLoggerImpl {
    fn log_date(&self) {
        let secs = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        self.logger.log(&format!("{}s since epoch", secs));
    }
}

// Describe them to the container

reflect_interface!("Logger", dyn Logger);
reflect_interface!("DateLogger", dyn DateLogger);

reflect_type!(
    StdoutLogger,
    Type::class::<StdoutLogger>("StdoutLogger")
        .constructor(&["prefix"], |prefix: Arc<String>| StdoutLogger { prefix })
        .implements::<dyn Logger, _>(|l| l as Arc<dyn Logger>)
        .build()
);

reflect_type!(
    DateLoggerImpl,
    Type::class::<DateLoggerImpl>("DateLoggerImpl")
        .constructor(&["logger"], DateLoggerImpl::new)
        .implements::<dyn DateLogger, _>(|l| l as Arc<dyn DateLogger>)
        .build()
);

fn main() -> Result<(), WiringError> {
    let container = Container::new();
    container
        .register_instance_as::<String>(None, Arc::new("main".to_string()))?
        .register_mapping::<dyn Logger, StdoutLogger>(None, Some(Arc::new(ContainerControlled::new())))?
        .register_mapping::<dyn DateLogger, DateLoggerImpl>(None, None)?;

    let b: Arc<dyn DateLogger> = container.resolve_as(None)?;
    b.log_date();

    // A child container can replace the configuration value
    let child = container.create_child_container();
    child.register_instance_as::<String>(None, Arc::new("child".to_string()))?;
    let logger: Arc<dyn Logger> = child.resolve_as(None)?;
    logger.log("the logger singleton is shared with the parent");

    for registration in container.registrations().iter() {
        println!("{:?} -> {:?}", registration.contract, registration.category);
    }

    container.dispose();
    Ok(())
}
