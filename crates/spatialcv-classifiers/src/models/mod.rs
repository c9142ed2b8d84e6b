pub mod gbdt;
pub mod maximum_likelihood;
pub mod minimum_distance;
pub mod trained;

pub mod classifier_trait;
pub mod factory;

pub use classifier_trait::ClassifierModel;
pub use trained::TrainedClassifier;
