//! Customer management

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use stripe::{CreateCustomer, Customer};

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};
use crate::records::{Collection, CustomerRecord};
use crate::store::{Patch, RecordStore};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCustomerRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CustomerCreated {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    /// Unix seconds
    pub created: Option<i64>,
}

pub struct CustomerService {
    stripe: StripeClient,
    store: Arc<dyn RecordStore>,
}

impl CustomerService {
    pub fn new(stripe: StripeClient, store: Arc<dyn RecordStore>) -> Self {
        Self { stripe, store }
    }

    /// Create a Stripe customer and persist it under `customers/<id>`
    pub async fn create_customer(
        &self,
        request: CreateCustomerRequest,
    ) -> BillingResult<CustomerCreated> {
        let params = CreateCustomer {
            name: request.name.as_deref(),
            email: request.email.as_deref(),
            phone: request.phone.as_deref(),
            metadata: if request.metadata.is_empty() {
                None
            } else {
                Some(request.metadata.clone())
            },
            ..Default::default()
        };

        let customer = Customer::create(self.stripe.inner(), params)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Error creating customer");
                BillingError::from(e)
            })?;

        let record = CustomerRecord {
            id: customer.id.to_string(),
            name: customer.name.clone(),
            email: customer.email.clone(),
            phone: customer.phone.clone(),
            created_at: None,
        };

        self.store
            .set(
                Collection::Customers,
                &record.id,
                Patch::from_record(&record)?.server_timestamp("created_at"),
            )
            .await?;

        tracing::info!(customer_id = %record.id, "Created new Stripe customer");

        Ok(CustomerCreated {
            id: record.id,
            name: record.name,
            email: record.email,
            phone: record.phone,
            created: customer.created,
        })
    }
}
