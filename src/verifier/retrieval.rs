//! GetWalletResponse: the Verifier front-end collects the validated
//! wallet response.
//!
//! In redirect mode the response code is single-use: a successful
//! retrieval retires the record, and any later attempt — wrong code,
//! missing code, or a repeat — answers `NotFound`, indistinguishable from
//! a transaction that never existed.

use crate::core::identifiers::{ResponseCode, TransactionId};
use crate::core::presentation::{Presentation, StateTag, WalletResponseTO};
use crate::error::RetrievalError;
use crate::verifier::Verifier;

pub(crate) async fn get_wallet_response(
    verifier: &Verifier,
    transaction_id: &TransactionId,
    response_code: Option<&ResponseCode>,
) -> Result<WalletResponseTO, RetrievalError> {
    let presentation = verifier
        .store()
        .load_by_transaction_id(transaction_id)
        .await
        .ok_or(RetrievalError::NotFound)?;

    match presentation {
        Presentation::Submitted(submitted) => {
            match (&submitted.response_code, response_code) {
                (Some(expected), Some(supplied)) if expected == supplied => {
                    let view = WalletResponseTO::from(&submitted.wallet_response);
                    let consumed =
                        Presentation::Consumed(submitted.consume(verifier.now()));
                    if !verifier.store().swap(StateTag::Submitted, consumed).await {
                        // lost a race against another retrieval
                        return Err(RetrievalError::NotFound);
                    }
                    Ok(view)
                }
                // poll mode: no code on either side, repeatable
                (None, None) => Ok(WalletResponseTO::from(&submitted.wallet_response)),
                _ => Err(RetrievalError::NotFound),
            }
        }
        Presentation::Consumed(_) => Err(RetrievalError::NotFound),
        Presentation::TimedOut(_) => Err(RetrievalError::Expired),
        Presentation::Requested(_) | Presentation::RequestObjectRetrieved(_) => {
            Err(RetrievalError::InvalidState)
        }
    }
}
