//! Canned extractor for the pipeline unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::extract::{ExtractionError, ExtractionInput, Extractor, PackageDetails, PromoDetails};

#[derive(Default)]
pub(crate) struct StubExtractor {
    promo: Mutex<Option<PromoDetails>>,
    package: Mutex<Option<PackageDetails>>,
    promo_calls: AtomicUsize,
    package_calls: AtomicUsize,
}

impl StubExtractor {
    pub(crate) fn with_promo(promo: Option<PromoDetails>) -> Self {
        Self {
            promo: Mutex::new(promo),
            ..Default::default()
        }
    }

    pub(crate) fn with_package(package: Option<PackageDetails>) -> Self {
        Self {
            package: Mutex::new(package),
            ..Default::default()
        }
    }

    pub(crate) fn set_package(&self, package: Option<PackageDetails>) {
        *self.package.lock().unwrap() = package;
    }

    pub(crate) fn promo_calls(&self) -> usize {
        self.promo_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn package_calls(&self) -> usize {
        self.package_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Extractor for StubExtractor {
    async fn extract_promo(
        &self,
        _input: &ExtractionInput,
    ) -> Result<Option<PromoDetails>, ExtractionError> {
        self.promo_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.promo.lock().unwrap().clone())
    }

    async fn extract_package(
        &self,
        _input: &ExtractionInput,
    ) -> Result<Option<PackageDetails>, ExtractionError> {
        self.package_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.package.lock().unwrap().clone())
    }
}
