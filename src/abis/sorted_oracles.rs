use alloy::sol;

sol! {
    #[sol(rpc)]
    interface ISortedOracles {
        function medianRate(address token) external view returns (uint256 numerator, uint256 denominator);
    }
}
