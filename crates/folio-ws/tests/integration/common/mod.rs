pub mod mock_execution;
