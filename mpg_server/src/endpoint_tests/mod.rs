mod helpers;
mod issuance;
mod mocks;
mod notifications;
mod orders;
