//! Solidity interfaces the pipeline calls or encodes for.

use alloy_sol_types::sol;

sol! {
    /// Factory deploying passkey accounts behind an ERC-1967 proxy.
    interface IAccountFactory {
        /// Counterfactual address for the given key, owner and salt.
        function getAddress(bytes32 x, bytes32 y, address owner, uint256 salt) external view returns (address);

        /// Deploys the account, or returns it if it already exists.
        function createAccount(bytes32 x, bytes32 y, address owner, uint256 salt) external returns (address);
    }

    /// The nonce half of the EntryPoint.
    interface IEntryPoint {
        /// Next nonce for `sender` in namespace `key`.
        function getNonce(address sender, uint192 key) external view returns (uint256 nonce);
    }

    /// Execution entry points of the account.
    interface IAccount {
        function execute(address dest, uint256 value, bytes calldata func) external;

        function executeBatch(address[] calldata dest, uint256[] calldata value, bytes[] calldata func) external;
    }
}
