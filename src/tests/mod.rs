mod test_kinematic_graph;
