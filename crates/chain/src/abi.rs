use alloy::sol;

// ─── Circle Factory ─────────────────────────────────────────────────────────
sol! {
    #[allow(missing_docs)]
    #[derive(Debug, PartialEq, Eq)]
    #[sol(rpc)]
    contract KyeFactory {
        event CircleCreated(
            address indexed creator,
            address indexed circleAddress,
            bytes32 groupIdHash,
            uint256 depositAmount
        );
    }
}

// ─── Circle (one deployed group contract per circle) ────────────────────────
sol! {
    #[allow(missing_docs)]
    #[derive(Debug, PartialEq, Eq)]
    #[sol(rpc)]
    contract KyeGroup {
        event MemberJoined(address indexed member, bytes32 userIdHash);
        event RoundStarted(uint256 indexed roundIndex, address indexed beneficiary, uint256 deadline);
        event DepositMade(
            address indexed member,
            uint256 indexed roundIndex,
            uint256 amount,
            uint256 penalty
        );
        event PayoutExecuted(address indexed beneficiary, uint256 indexed roundIndex, uint256 amount);
        event PenaltyCharged(address indexed member, uint256 indexed roundIndex, uint256 amount);
        event PhaseChanged(uint8 oldPhase, uint8 newPhase);

        function name() external view returns (string memory);
        function maxMembers() external view returns (uint256);
        /// Seconds per round.
        function roundDuration() external view returns (uint256);
        function penaltyBps() external view returns (uint256);
    }
}
