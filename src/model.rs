//! Text-classification model: tokenization, count vectorization, TF-IDF
//! weighting, and a multi-output gradient-boosted tree classifier, composed
//! into a fit/predict pipeline with a versioned on-disk artifact.

pub mod gbdt;
pub mod pipeline;
pub mod search;
pub mod tfidf;
pub mod tokenize;
pub mod vectorize;
