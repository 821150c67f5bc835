//! Presale, airdrop and token ABI definitions
//!
//! Uses alloy's sol! macro to generate type-safe bindings.

use alloy::sol;

sol! {
    /// ERC20 interface used for both the payment token (USDC) and CHRONO
    #[sol(rpc)]
    contract ERC20 {
        function name() external view returns (string);
        function symbol() external view returns (string);
        function decimals() external view returns (uint8);
        function totalSupply() external view returns (uint256);
        function balanceOf(address account) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
        function transfer(address to, uint256 amount) external returns (bool);

        event Transfer(address indexed from, address indexed to, uint256 value);
        event Approval(address indexed owner, address indexed spender, uint256 value);
    }
}

sol! {
    /// Presale contract: sells CHRONO for the payment token at a fixed rate
    #[sol(rpc)]
    contract Presale {
        /// Spend `amount` payment-token base units; requires prior approval
        function buyTokens(uint256 amount) external;

        function totalRaised() external view returns (uint256);
        function hardCap() external view returns (uint256);
        /// CHRONO per whole payment token
        function rate() external view returns (uint256);
        function contributions(address account) external view returns (uint256);
        function paymentToken() external view returns (address);

        event TokensPurchased(address indexed buyer, uint256 amount, uint256 cost);
    }
}

sol! {
    /// Airdrop distributor with a precomputed eligibility list
    #[sol(rpc)]
    contract Airdrop {
        function claim() external;
        function isEligible(address account) external view returns (bool);
        function hasClaimed(address account) external view returns (bool);
        function AIRDROP_AMOUNT() external view returns (uint256);

        event TokensClaimed(address indexed claimer, uint256 amount);
    }
}
