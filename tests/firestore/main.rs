mod codec_tests;
mod document_tests;
mod listen_tests;
mod query_tests;
mod transaction_tests;
mod write_batch_tests;
